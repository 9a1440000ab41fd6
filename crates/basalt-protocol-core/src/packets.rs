use basalt_types::{BlockPos, GameMode, GameProfile, ItemStack, TextComponent, Vec3d};
use uuid::Uuid;

/// Version-independent serverbound packet representation.
/// Protocol adapters decode the wire format into these.
#[derive(Debug, Clone)]
pub enum ServerboundPacket {
    // === Handshake ===
    Intention {
        protocol_version: i32,
        server_address: String,
        server_port: u16,
        next_state: i32,
    },

    // === Status ===
    StatusRequest,
    PingRequest {
        payload: i64,
    },

    // === Login ===
    Hello {
        name: String,
        uuid: Uuid,
    },
    Key {
        encrypted_shared_secret: Vec<u8>,
        encrypted_verify_token: Vec<u8>,
    },
    LoginAcknowledged,

    // === Configuration (ClientInformation and CustomPayload also occur in Play) ===
    ClientInformation {
        locale: String,
        view_distance: i8,
        chat_mode: i32,
        chat_colors: bool,
        skin_parts: u8,
        main_hand: i32,
        text_filtering: bool,
        allow_listing: bool,
    },
    CustomPayload {
        channel: String,
        data: Vec<u8>,
    },
    SelectKnownPacks {
        packs: Vec<KnownPack>,
    },
    FinishConfiguration,

    // === Play ===
    AcceptTeleportation {
        teleport_id: i32,
    },
    KeepAlive {
        id: i64,
    },
    Chat {
        message: String,
        timestamp: i64,
        salt: i64,
        signature: Option<Vec<u8>>,
    },
    ChatCommand {
        command: String,
    },
    ChatAck,
    ChatSessionUpdate,
    MovePlayerPos {
        position: Vec3d,
        flags: u8,
    },
    MovePlayerPosRot {
        position: Vec3d,
        yaw: f32,
        pitch: f32,
        flags: u8,
    },
    MovePlayerRot {
        yaw: f32,
        pitch: f32,
        flags: u8,
    },
    MovePlayerStatusOnly {
        flags: u8,
    },
    PlayerCommand {
        entity_id: i32,
        action: i32,
        data: i32,
    },
    PlayerAbilities {
        flags: u8,
    },
    PlayerInput {
        flags: u8,
    },
    SetCarriedItem {
        slot: i16,
    },
    SetCreativeModeSlot {
        slot: i16,
        item: Option<ItemStack>,
    },
    PlayerAction {
        action: i32,
        position: BlockPos,
        face: u8,
        sequence: i32,
    },
    Swing {
        hand: i32,
    },
    UseItemOn {
        hand: i32,
        position: BlockPos,
        face: u8,
        cursor_x: f32,
        cursor_y: f32,
        cursor_z: f32,
        inside_block: bool,
        world_border_hit: bool,
        sequence: i32,
    },
    UseItem {
        hand: i32,
        sequence: i32,
        yaw: f32,
        pitch: f32,
    },
    ChunkBatchReceived {
        chunks_per_tick: f32,
    },
    ClientTickEnd,
    PlayerLoaded,
}

/// Version-independent clientbound packet representation.
/// Protocol adapters encode these into wire format.
#[derive(Debug, Clone)]
pub enum ClientboundPacket {
    // === Status ===
    StatusResponse {
        json: String,
    },
    PongResponse {
        payload: i64,
    },

    // === Login ===
    /// Encryption request.
    Hello {
        server_id: String,
        public_key: Vec<u8>,
        verify_token: Vec<u8>,
        should_authenticate: bool,
    },
    LoginFinished {
        profile: GameProfile,
    },

    // === Configuration ===
    SelectKnownPacks {
        packs: Vec<KnownPack>,
    },
    /// Pre-encoded registry_data body built by registry finalization.
    RegistryData {
        body: Vec<u8>,
    },
    /// Pre-encoded update_tags body built by registry finalization.
    UpdateTags {
        body: Vec<u8>,
    },
    UpdateEnabledFeatures {
        features: Vec<String>,
    },
    CustomReportDetails {
        details: Vec<(String, String)>,
    },
    ServerLinks {
        links: Vec<(i32, String)>,
    },
    FinishConfiguration,

    // === Shared ===
    /// Custom payload; valid in Configuration and Play.
    CustomPayload {
        channel: String,
        data: Vec<u8>,
    },
    /// JSON text in Login, NBT text in Configuration and Play.
    Disconnect {
        reason: TextComponent,
    },
    KeepAlive {
        id: i64,
    },

    // === Play ===
    Login {
        entity_id: i32,
        dimension_names: Vec<String>,
        max_players: i32,
        view_distance: i32,
        simulation_distance: i32,
        dimension_type: i32,
        dimension_name: String,
        hashed_seed: i64,
        game_mode: GameMode,
        is_flat: bool,
        sea_level: i32,
        enforces_secure_chat: bool,
    },
    GameEvent {
        event: u8,
        value: f32,
    },
    /// Synchronize player position; all-absolute, zero velocity.
    PlayerPosition {
        teleport_id: i32,
        position: Vec3d,
        yaw: f32,
        pitch: f32,
    },
    SetChunkCacheCenter {
        chunk_x: i32,
        chunk_z: i32,
    },
    SetDefaultSpawnPosition {
        position: BlockPos,
        angle: f32,
    },
    ChunkBatchStart,
    ChunkBatchFinished {
        batch_size: i32,
    },
    /// Chunk data with (empty) light. `heightmaps` carries packed long arrays
    /// keyed by heightmap type id; `data` is the serialized section sequence.
    LevelChunkWithLight {
        chunk_x: i32,
        chunk_z: i32,
        heightmaps: Vec<(i32, Vec<i64>)>,
        data: Vec<u8>,
    },
    ForgetLevelChunk {
        chunk_x: i32,
        chunk_z: i32,
    },
    BlockUpdate {
        position: BlockPos,
        state_id: i32,
    },
    BlockChangedAck {
        sequence: i32,
    },
    SystemChat {
        content: TextComponent,
        overlay: bool,
    },
    /// A chat message attributed to a sender without a signature.
    DisguisedChat {
        message: TextComponent,
        chat_type: i32,
        sender_name: TextComponent,
    },
    PlayerInfoUpdate {
        actions: u8,
        players: Vec<PlayerInfoEntry>,
    },
    PlayerInfoRemove {
        uuids: Vec<Uuid>,
    },
    AddEntity {
        entity_id: i32,
        entity_uuid: Uuid,
        entity_type: i32,
        position: Vec3d,
        pitch: u8,
        yaw: u8,
        head_yaw: u8,
        data: i32,
    },
    RemoveEntities {
        entity_ids: Vec<i32>,
    },
    /// Absolute entity position sync (the 772 teleport form).
    TeleportEntity {
        entity_id: i32,
        position: Vec3d,
        yaw: f32,
        pitch: f32,
        on_ground: bool,
    },
    RotateHead {
        entity_id: i32,
        head_yaw: u8,
    },
    SetEntityData {
        entity_id: i32,
        metadata: Vec<MetadataEntry>,
    },
    Animate {
        entity_id: i32,
        action: u8,
    },
    Respawn {
        dimension_type: i32,
        dimension_name: String,
        hashed_seed: i64,
        game_mode: GameMode,
        is_flat: bool,
        sea_level: i32,
        data_kept: u8,
    },
}

/// Player Info Update action bitmask flags.
pub mod player_info_actions {
    pub const ADD_PLAYER: u8 = 0x01;
    pub const INITIALIZE_CHAT: u8 = 0x02;
    pub const UPDATE_GAME_MODE: u8 = 0x04;
    pub const UPDATE_LISTED: u8 = 0x08;
    pub const UPDATE_LATENCY: u8 = 0x10;
    pub const UPDATE_DISPLAY_NAME: u8 = 0x20;
}

/// A single player entry in a PlayerInfoUpdate packet.
#[derive(Debug, Clone)]
pub struct PlayerInfoEntry {
    pub uuid: Uuid,
    /// Present when ADD_PLAYER action is set.
    pub name: Option<String>,
    /// Properties (name, value, signature) — present with ADD_PLAYER.
    pub properties: Vec<(String, String, Option<String>)>,
    /// Present when UPDATE_GAME_MODE action is set.
    pub game_mode: Option<i32>,
    /// Present when UPDATE_LISTED action is set.
    pub listed: Option<bool>,
    /// Present when UPDATE_LATENCY action is set.
    pub ping: Option<i32>,
}

/// Entity metadata serializer ids used by the core.
pub mod metadata_kind {
    pub const BYTE: i32 = 0;
    pub const POSE: i32 = 21;
}

/// A single entity metadata entry, value pre-serialized.
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    pub index: u8,
    pub kind: i32,
    pub data: Vec<u8>,
}

impl MetadataEntry {
    pub fn byte(index: u8, value: u8) -> Self {
        Self {
            index,
            kind: metadata_kind::BYTE,
            data: vec![value],
        }
    }

    /// Pose values are varints, but every pose the core emits fits one byte.
    pub fn pose(index: u8, pose: u8) -> Self {
        Self {
            index,
            kind: metadata_kind::POSE,
            data: vec![pose],
        }
    }
}

/// Entity poses the core cares about.
pub mod pose {
    pub const STANDING: u8 = 0;
    pub const SNEAKING: u8 = 5;
}

/// Entity metadata indices shared by all living entities.
pub mod metadata_index {
    /// Bit flags: 0x02 sneaking, 0x08 sprinting.
    pub const SHARED_FLAGS: u8 = 0;
    pub const POSE: u8 = 6;
    /// Displayed skin layer mask on players.
    pub const PLAYER_SKIN_LAYERS: u8 = 17;
    /// 0 = left, 1 = right.
    pub const PLAYER_MAIN_HAND: u8 = 18;
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnownPack {
    pub namespace: String,
    pub id: String,
    pub version: String,
}
