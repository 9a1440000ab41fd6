use crate::game::PlayerId;
use crate::handler::PlayerHandler;
use basalt_protocol_core::{
    metadata_index, pose, ClientboundPacket, MetadataEntry, ServerboundPacket,
};
use basalt_types::{BlockPos, ChunkPos, GameProfile, ItemStack, Vec3d};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub(crate) type PacketSender = mpsc::UnboundedSender<ClientboundPacket>;

/// What the per-connection reader task feeds into the game loop.
pub(crate) enum InboundEvent {
    Packet(ServerboundPacket),
    /// Decode or protocol error; the connection must be torn down.
    Error(String),
}

/// Hand-off from a connection task that finished configuration.
pub(crate) struct NewPlayer {
    pub profile: GameProfile,
    pub skin: SkinSettings,
    pub packet_tx: PacketSender,
    pub inbound_rx: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Displayed skin layers and main hand, from client_information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SkinSettings {
    /// Layer mask, 7 bits.
    pub layers: u8,
    /// 0 = left, 1 = right.
    pub main_hand: u8,
}

impl Default for SkinSettings {
    fn default() -> Self {
        Self {
            layers: 0x7F,
            main_hand: 1,
        }
    }
}

/// Game-loop-side state of one connected player.
pub(crate) struct PlayerConn {
    pub profile: GameProfile,
    pub packet_tx: PacketSender,
    pub inbound_rx: mpsc::UnboundedReceiver<InboundEvent>,
    /// Identifier of the dimension the player is in.
    pub dimension: String,
    /// Entity id within that dimension; 0 while unregistered. The client
    /// itself is always addressed as entity 0.
    pub entity_id: i32,

    pub position: Vec3d,
    pub yaw: f32,
    pub pitch: f32,
    pub on_ground: bool,
    pub against_wall: bool,
    pub sneaking: bool,
    pub sprinting: bool,

    pub inventory: HashMap<i16, ItemStack>,
    pub selected_slot: u8,
    pub skin: SkinSettings,

    /// Shadows used to detect block / chunk boundary crossings.
    pub block_shadow: BlockPos,
    pub chunk_shadow: ChunkPos,

    /// Connections receiving this player's movement/animation/metadata
    /// updates. Scrubbed when either side is removed.
    pub listeners: Vec<PlayerId>,

    pub teleport_id: i32,
    pub teleport_acked: bool,

    pub keepalive_id: i64,
    pub keepalive_received: bool,
    pub next_keepalive: Instant,

    pub handler: Option<Box<dyn PlayerHandler>>,
}

impl PlayerConn {
    pub fn new(new_player: NewPlayer, dimension: String) -> Self {
        Self {
            profile: new_player.profile,
            packet_tx: new_player.packet_tx,
            inbound_rx: new_player.inbound_rx,
            dimension,
            entity_id: 0,
            position: Vec3d::new(0.0, 0.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            on_ground: false,
            against_wall: false,
            sneaking: false,
            sprinting: false,
            inventory: HashMap::new(),
            selected_slot: 0,
            skin: new_player.skin,
            block_shadow: BlockPos::new(0, 0, 0),
            chunk_shadow: ChunkPos::new(0, 0),
            listeners: Vec::new(),
            teleport_id: 0,
            teleport_acked: true,
            keepalive_id: 0,
            keepalive_received: true,
            next_keepalive: Instant::now(),
            handler: None,
        }
    }

    /// Queue a clientbound packet; the writer task picks it up in order.
    pub fn send(&self, packet: ClientboundPacket) {
        let _ = self.packet_tx.send(packet);
    }

    /// Allocate the next teleport id and clear the acknowledgment.
    pub fn begin_teleport(&mut self) -> i32 {
        self.teleport_id += 1;
        self.teleport_acked = false;
        self.teleport_id
    }

    /// Entity metadata reflecting posture and skin settings.
    pub fn metadata(&self) -> Vec<MetadataEntry> {
        let mut flags = 0u8;
        if self.sneaking {
            flags |= 0x02;
        }
        if self.sprinting {
            flags |= 0x08;
        }
        let pose = if self.sneaking {
            pose::SNEAKING
        } else {
            pose::STANDING
        };
        vec![
            MetadataEntry::byte(metadata_index::SHARED_FLAGS, flags),
            MetadataEntry::pose(metadata_index::POSE, pose),
            MetadataEntry::byte(metadata_index::PLAYER_SKIN_LAYERS, self.skin.layers),
            MetadataEntry::byte(metadata_index::PLAYER_MAIN_HAND, self.skin.main_hand),
        ]
    }

    /// Tab-list entry for player_info_update with ADD_PLAYER | UPDATE_LISTED.
    pub fn info_entry(&self) -> basalt_protocol_core::PlayerInfoEntry {
        basalt_protocol_core::PlayerInfoEntry {
            uuid: self.profile.uuid,
            name: Some(self.profile.name.clone()),
            properties: self
                .profile
                .properties
                .iter()
                .map(|p| (p.name.clone(), p.value.clone(), p.signature.clone()))
                .collect(),
            game_mode: None,
            listed: Some(true),
            ping: None,
        }
    }
}
