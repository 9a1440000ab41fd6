use crate::dimension::{Dimension, EntityKind, EntityUuid, NetworkId, PlayerRef, Position, Rotation};
use crate::handler::{DimensionHandler, HandlerResult, JoinDecision, PlayerHandler};
use crate::player::{InboundEvent, NewPlayer, PlayerConn, SkinSettings};
use crate::server::ServerShared;
use basalt_protocol_core::{player_info_actions, ClientboundPacket, ServerboundPacket};
use basalt_registry::Registry;
use basalt_types::{
    angle_to_byte, clamp_pitch, wrap_yaw, BlockPos, ChunkPos, GameMode, ItemStack, TextComponent,
    Vec3d,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const TICK_DURATION: Duration = Duration::from_millis(50);
/// "Start waiting for level chunks".
const GAME_EVENT_START_CHUNKS: u8 = 13;
/// Respawn keeps attributes and metadata across a dimension change.
const RESPAWN_DATA_KEPT: u8 = 3;

/// Opaque handle to a connected player, stable across dimension transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(pub(crate) u64);

/// Mutable view handed to [`DimensionHandler`] and [`PlayerHandler`] methods.
pub struct DimensionCtx<'a> {
    pub(crate) dim: &'a mut Dimension,
    pub(crate) conns: &'a mut HashMap<PlayerId, PlayerConn>,
    pub(crate) registry: &'a Registry,
    pub(crate) transfers: &'a mut Vec<(PlayerId, String)>,
}

/// A player's posture flags as last reported by the client.
#[derive(Debug, Clone, Copy)]
pub struct PlayerPosture {
    pub on_ground: bool,
    pub against_wall: bool,
    pub sneaking: bool,
    pub sprinting: bool,
}

impl DimensionCtx<'_> {
    pub fn dimension_id(&self) -> &str {
        &self.dim.id
    }

    pub fn spawn_point(&self) -> Vec3d {
        self.dim.spawn_point
    }

    pub fn view_distance(&self) -> i32 {
        self.dim.view_distance
    }

    /// Players currently in this dimension.
    pub fn players(&self) -> Vec<PlayerId> {
        self.dim.players.clone()
    }

    pub fn player_name(&self, id: PlayerId) -> Option<String> {
        self.conns.get(&id).map(|c| c.profile.name.clone())
    }

    pub fn player_uuid(&self, id: PlayerId) -> Option<Uuid> {
        self.conns.get(&id).map(|c| c.profile.uuid)
    }

    pub fn player_position(&self, id: PlayerId) -> Option<Vec3d> {
        self.conns.get(&id).map(|c| c.position)
    }

    pub fn player_posture(&self, id: PlayerId) -> Option<PlayerPosture> {
        self.conns.get(&id).map(|c| PlayerPosture {
            on_ground: c.on_ground,
            against_wall: c.against_wall,
            sneaking: c.sneaking,
            sprinting: c.sprinting,
        })
    }

    /// The item in the player's selected hotbar slot, if any.
    pub fn player_held_item(&self, id: PlayerId) -> Option<ItemStack> {
        let conn = self.conns.get(&id)?;
        conn.inventory.get(&(36 + conn.selected_slot as i16)).cloned()
    }

    /// Move the player without a position synchronization; used before the
    /// initial chunk stream.
    pub fn set_player_position(&mut self, id: PlayerId, position: Vec3d) {
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.position = position;
            conn.block_shadow = position.block_pos();
        }
    }

    /// Resolve a block identifier (or state key) and write it, fanning out
    /// the update to every player in the dimension.
    pub fn set_block(&mut self, pos: BlockPos, block: &str) -> bool {
        match self.registry.block_state_id(block) {
            Some(state) => {
                self.set_block_state(pos, state);
                true
            }
            None => {
                warn!("set_block: unknown block {block}");
                false
            }
        }
    }

    pub fn set_block_state(&mut self, pos: BlockPos, state: i32) {
        if let Err(e) = self.dim.write_block(pos, state) {
            warn!("set_block at {:?} failed: {e:#}", pos);
            return;
        }
        self.send_to_dimension(ClientboundPacket::BlockUpdate {
            position: pos,
            state_id: state,
        });
    }

    pub fn broadcast_system(&mut self, content: TextComponent) {
        self.send_to_dimension(ClientboundPacket::SystemChat {
            content,
            overlay: false,
        });
    }

    /// Broadcast a chat message attributed to `sender` using the plain chat type.
    pub fn broadcast_chat(&mut self, sender: PlayerId, message: &str) {
        let Some(name) = self.player_name(sender) else {
            return;
        };
        let chat_type = self
            .registry
            .id_of("minecraft:chat_type", "minecraft:chat")
            .unwrap_or(0);
        self.send_to_dimension(ClientboundPacket::DisguisedChat {
            message: TextComponent::plain(message),
            chat_type,
            sender_name: TextComponent::plain(name),
        });
    }

    pub fn send_system(&self, id: PlayerId, content: TextComponent) {
        self.send_packet(
            id,
            ClientboundPacket::SystemChat {
                content,
                overlay: false,
            },
        );
    }

    pub fn send_packet(&self, id: PlayerId, packet: ClientboundPacket) {
        if let Some(conn) = self.conns.get(&id) {
            conn.send(packet);
        }
    }

    /// Spawn a non-player entity and announce it to the dimension.
    /// Returns its entity id.
    pub fn spawn_entity(&mut self, kind: &str, position: Vec3d, yaw: f32, pitch: f32) -> Option<i32> {
        let net_id = self.registry.id_of("minecraft:entity_type", kind)?;
        let entity_id = self.dim.next_entity_id();
        let uuid = Uuid::new_v4();
        self.dim.world.spawn((
            NetworkId(entity_id),
            EntityUuid(uuid),
            EntityKind { net_id },
            Position(position),
            Rotation { yaw, pitch },
        ));
        self.send_to_dimension(ClientboundPacket::AddEntity {
            entity_id,
            entity_uuid: uuid,
            entity_type: net_id,
            position,
            pitch: angle_to_byte(pitch),
            yaw: angle_to_byte(yaw),
            head_yaw: angle_to_byte(yaw),
            data: 0,
        });
        Some(entity_id)
    }

    pub fn set_player_handler(&mut self, id: PlayerId, handler: Box<dyn PlayerHandler>) {
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.handler = Some(handler);
        }
    }

    /// Queue a dimension transfer; it runs after the current handler returns.
    pub fn transfer_player(&mut self, id: PlayerId, dimension: &str) {
        self.transfers.push((id, dimension.to_string()));
    }

    fn send_to_dimension(&self, packet: ClientboundPacket) {
        for id in &self.dim.players {
            if let Some(conn) = self.conns.get(id) {
                conn.send(packet.clone());
            }
        }
    }
}

enum PlayerEvent {
    Chat(String),
    Command(String),
    SetSlot(i16, Option<ItemStack>),
    SelectSlot(u8),
}

pub(crate) struct GameState {
    shared: Arc<ServerShared>,
    dimensions: HashMap<String, Dimension>,
    default_dimension: String,
    conns: HashMap<PlayerId, PlayerConn>,
    next_player_id: u64,
    transfers: Vec<(PlayerId, String)>,
}

/// The single task owning all game state. Every mutation of dimensions and
/// players happens here, fed by per-connection channels in wire order.
pub(crate) async fn run_game_loop(
    shared: Arc<ServerShared>,
    dimensions: HashMap<String, Dimension>,
    default_dimension: String,
    mut new_player_rx: mpsc::UnboundedReceiver<NewPlayer>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let mut state = GameState::new(shared, dimensions, default_dimension);
    info!("game loop started (20 TPS)");

    loop {
        if *shutdown_rx.borrow() {
            state.shutdown();
            return;
        }
        let tick_start = Instant::now();

        // 1. Admit players that finished configuration.
        while let Ok(new_player) = new_player_rx.try_recv() {
            state.admit_player(new_player);
        }

        // 2. Drain inbound packets, preserving per-connection wire order.
        let mut events: Vec<(PlayerId, InboundEvent)> = Vec::new();
        let mut disconnected: Vec<PlayerId> = Vec::new();
        for (&id, conn) in state.conns.iter_mut() {
            loop {
                match conn.inbound_rx.try_recv() {
                    Ok(event) => events.push((id, event)),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        disconnected.push(id);
                        break;
                    }
                }
            }
        }

        // 3. Clean disconnects (socket closed without an error).
        for id in disconnected {
            state.drop_player(id, None);
        }

        // 4. Dispatch.
        for (id, event) in events {
            match event {
                InboundEvent::Packet(packet) => state.handle_packet(id, packet),
                InboundEvent::Error(message) => {
                    error!("connection error for {:?}: {}", id, message);
                    state.drop_player(id, Some(TextComponent::plain("Internal server error")));
                }
            }
        }

        // 5. Transfers queued by handlers.
        state.process_transfers();

        // 6. Timers.
        state.tick_keep_alive();
        state.tick_dimensions();

        let elapsed = tick_start.elapsed();
        if elapsed < TICK_DURATION {
            tokio::time::sleep(TICK_DURATION - elapsed).await;
        } else {
            warn!("tick took {:?} (over 50ms budget)", elapsed);
        }
    }
}

impl GameState {
    fn new(
        shared: Arc<ServerShared>,
        dimensions: HashMap<String, Dimension>,
        default_dimension: String,
    ) -> Self {
        Self {
            shared,
            dimensions,
            default_dimension,
            conns: HashMap::new(),
            next_player_id: 1,
            transfers: Vec::new(),
        }
    }

    fn update_player_count(&self) {
        self.shared
            .player_count
            .store(self.conns.len(), Ordering::Relaxed);
    }

    // === Join / leave ===

    fn admit_player(&mut self, new_player: NewPlayer) {
        let dimension = match self.shared.handler.on_join(&new_player.profile) {
            JoinDecision::Deny(reason) => {
                info!("join denied for {}", new_player.profile.name);
                let _ = new_player
                    .packet_tx
                    .send(ClientboundPacket::Disconnect { reason });
                return;
            }
            JoinDecision::Allow { dimension } => dimension,
        };
        let dimension = dimension
            .filter(|d| {
                let known = self.dimensions.contains_key(d);
                if !known {
                    warn!("on_join chose unknown dimension {d}; using default");
                }
                known
            })
            .unwrap_or_else(|| self.default_dimension.clone());

        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        info!(
            "{} ({}) joining {}",
            new_player.profile.name, new_player.profile.uuid, dimension
        );

        let conn = PlayerConn::new(new_player, dimension.clone());
        let dim = &self.dimensions[&dimension];
        conn.send(ClientboundPacket::Login {
            entity_id: 0,
            dimension_names: self.dimensions.keys().cloned().collect(),
            max_players: self.shared.properties.max_players as i32,
            view_distance: dim.view_distance,
            simulation_distance: dim.view_distance,
            dimension_type: dim.type_net_id,
            dimension_name: dim.id.clone(),
            hashed_seed: 0,
            game_mode: GameMode::Creative,
            is_flat: dim.is_flat,
            sea_level: dim.sea_level,
            enforces_secure_chat: false,
        });
        conn.send(ClientboundPacket::GameEvent {
            event: GAME_EVENT_START_CHUNKS,
            value: 0.0,
        });
        conn.send(ClientboundPacket::SetDefaultSpawnPosition {
            position: dim.spawn_point.block_pos(),
            angle: 0.0,
        });

        self.conns.insert(id, conn);
        self.add_player_to_dimension(id);
        self.start_keep_alive(id);
        self.update_player_count();
    }

    /// The full player-add sequence: tab entries and metadata both ways,
    /// entity registration, the join hook, position sync, the initial chunk
    /// square, and a second position sync once chunks are out.
    fn add_player_to_dimension(&mut self, id: PlayerId) {
        let Some(dim_name) = self.conns.get(&id).map(|c| c.dimension.clone()) else {
            return;
        };
        let Self {
            dimensions,
            conns,
            transfers,
            shared,
            ..
        } = self;
        let dim = dimensions.get_mut(&dim_name).expect("player dimension");

        // Existing players: the joiner learns each tab entry and metadata and
        // subscribes to each peer's updates.
        let existing = dim.players.clone();
        for &peer_id in &existing {
            let (entry, peer_eid, metadata) = {
                let peer = &conns[&peer_id];
                (peer.info_entry(), peer.entity_id, peer.metadata())
            };
            {
                let joining = &conns[&id];
                joining.send(ClientboundPacket::PlayerInfoUpdate {
                    actions: player_info_actions::ADD_PLAYER | player_info_actions::UPDATE_LISTED,
                    players: vec![entry],
                });
                joining.send(ClientboundPacket::SetEntityData {
                    entity_id: peer_eid,
                    metadata,
                });
            }
            conns.get_mut(&peer_id).unwrap().listeners.push(id);
        }

        // Existing entities: peers' bodies, then plain entities.
        {
            let joining = &conns[&id];
            for &peer_id in &existing {
                let peer = &conns[&peer_id];
                joining.send(ClientboundPacket::AddEntity {
                    entity_id: peer.entity_id,
                    entity_uuid: peer.profile.uuid,
                    entity_type: dim.player_entity_type,
                    position: peer.position,
                    pitch: angle_to_byte(peer.pitch),
                    yaw: angle_to_byte(peer.yaw),
                    head_yaw: angle_to_byte(peer.yaw),
                    data: 0,
                });
            }
            for (_, (net_id, uuid, kind, position, rotation)) in dim
                .world
                .query::<(&NetworkId, &EntityUuid, &EntityKind, &Position, &Rotation)>()
                .iter()
            {
                joining.send(ClientboundPacket::AddEntity {
                    entity_id: net_id.0,
                    entity_uuid: uuid.0,
                    entity_type: kind.net_id,
                    position: position.0,
                    pitch: angle_to_byte(rotation.pitch),
                    yaw: angle_to_byte(rotation.yaw),
                    head_yaw: angle_to_byte(rotation.yaw),
                    data: 0,
                });
            }
        }

        // Register the player as a dimension entity.
        let entity_id = dim.next_entity_id();
        {
            let conn = conns.get_mut(&id).unwrap();
            conn.entity_id = entity_id;
            dim.world
                .spawn((NetworkId(entity_id), PlayerRef(id), EntityUuid(conn.profile.uuid)));
        }
        dim.players.push(id);

        // Join hook; the default copies the spawn point into the position.
        let mut handler = dim.handler.take().expect("dimension handler");
        {
            let mut ctx = DimensionCtx {
                dim,
                conns,
                registry: shared.registry.as_ref(),
                transfers,
            };
            handler.on_player_joined(&mut ctx, id);
        }
        dim.handler = Some(handler);

        // Everyone (including the joiner) learns the new tab entry; peers also
        // spawn the body and subscribe to the joiner's updates.
        let (entry, metadata, joining_uuid, position, yaw, pitch) = {
            let joining = &conns[&id];
            (
                joining.info_entry(),
                joining.metadata(),
                joining.profile.uuid,
                joining.position,
                joining.yaw,
                joining.pitch,
            )
        };
        for peer_id in dim.players.clone() {
            {
                let peer = &conns[&peer_id];
                peer.send(ClientboundPacket::PlayerInfoUpdate {
                    actions: player_info_actions::ADD_PLAYER | player_info_actions::UPDATE_LISTED,
                    players: vec![entry.clone()],
                });
                peer.send(ClientboundPacket::SetEntityData {
                    entity_id: if peer_id == id { 0 } else { entity_id },
                    metadata: metadata.clone(),
                });
                if peer_id != id {
                    peer.send(ClientboundPacket::AddEntity {
                        entity_id,
                        entity_uuid: joining_uuid,
                        entity_type: dim.player_entity_type,
                        position,
                        pitch: angle_to_byte(pitch),
                        yaw: angle_to_byte(yaw),
                        head_yaw: angle_to_byte(yaw),
                        data: 0,
                    });
                }
            }
            if peer_id != id {
                conns.get_mut(&id).unwrap().listeners.push(peer_id);
            }
        }

        // First sync, the initial chunk square, and a second sync to catch a
        // client that slid while chunks streamed.
        let center = conns[&id].position.chunk_pos();
        Self::sync_position(conns.get_mut(&id).unwrap());
        Self::stream_chunks(dim, conns.get_mut(&id).unwrap(), center.x, center.z, true);
        Self::sync_position(conns.get_mut(&id).unwrap());
    }

    /// Remove the player from its dimension: despawn, tab removal, and
    /// scrubbing from every remaining listener list.
    fn remove_from_dimension(&mut self, id: PlayerId) {
        let Self {
            dimensions, conns, ..
        } = self;
        let Some(conn) = conns.get_mut(&id) else {
            return;
        };
        let dim_name = conn.dimension.clone();
        let entity_id = conn.entity_id;
        let uuid = conn.profile.uuid;
        conn.entity_id = 0;
        conn.listeners.clear();

        let Some(dim) = dimensions.get_mut(&dim_name) else {
            return;
        };
        dim.players.retain(|p| *p != id);
        let row = dim
            .world
            .query::<&PlayerRef>()
            .iter()
            .find(|(_, r)| r.0 == id)
            .map(|(e, _)| e);
        if let Some(row) = row {
            let _ = dim.world.despawn(row);
        }

        for peer_id in dim.players.clone() {
            let peer = conns.get_mut(&peer_id).unwrap();
            peer.listeners.retain(|l| *l != id);
            peer.send(ClientboundPacket::PlayerInfoRemove { uuids: vec![uuid] });
            peer.send(ClientboundPacket::RemoveEntities {
                entity_ids: vec![entity_id],
            });
        }
    }

    /// Tear the connection down, optionally with a best-effort disconnect
    /// message. Dropping the sender closes the writer and the socket.
    fn drop_player(&mut self, id: PlayerId, reason: Option<TextComponent>) {
        let Some(conn) = self.conns.get(&id) else {
            return;
        };
        let name = conn.profile.name.clone();
        if let Some(reason) = reason {
            conn.send(ClientboundPacket::Disconnect { reason });
        }
        self.remove_from_dimension(id);
        self.conns.remove(&id);
        self.update_player_count();
        info!("{} disconnected", name);
    }

    fn shutdown(&mut self) {
        for (_, conn) in self.conns.drain() {
            conn.send(ClientboundPacket::Disconnect {
                reason: TextComponent::translated("multiplayer.disconnect.server_shutdown"),
            });
        }
        self.update_player_count();
        info!("game loop stopped");
    }

    // === Position sync and chunk streaming ===

    fn sync_position(conn: &mut PlayerConn) {
        let teleport_id = conn.begin_teleport();
        let packet = ClientboundPacket::PlayerPosition {
            teleport_id,
            position: conn.position,
            yaw: conn.yaw,
            pitch: conn.pitch,
        };
        conn.send(packet);
    }

    /// Send the view-distance square around `(cx, cz)`. With `load_all` every
    /// coordinate is sent; otherwise only coordinates outside the previous
    /// square. The extra margin matches the client's accept window.
    fn stream_chunks(dim: &mut Dimension, conn: &mut PlayerConn, cx: i32, cz: i32, load_all: bool) {
        conn.send(ClientboundPacket::SetChunkCacheCenter {
            chunk_x: cx,
            chunk_z: cz,
        });
        let radius = dim.view_distance + 3;
        let prev = conn.chunk_shadow;
        conn.chunk_shadow = ChunkPos::new(cx, cz);

        conn.send(ClientboundPacket::ChunkBatchStart);
        let mut batch_size = 0;
        for x in (cx - radius)..=(cx + radius) {
            for z in (cz - radius)..=(cz + radius) {
                if load_all || (x - prev.x).abs() > radius || (z - prev.z).abs() > radius {
                    conn.send(dim.chunk_packet(x, z));
                    batch_size += 1;
                }
            }
        }
        conn.send(ClientboundPacket::ChunkBatchFinished { batch_size });
    }

    // === Handler plumbing ===

    fn dispatch_dim<F>(&mut self, id: PlayerId, f: F)
    where
        F: FnOnce(&mut dyn DimensionHandler, &mut DimensionCtx, PlayerId),
    {
        let Some(dim_name) = self.conns.get(&id).map(|c| c.dimension.clone()) else {
            return;
        };
        let Self {
            dimensions,
            conns,
            transfers,
            shared,
            ..
        } = self;
        let Some(dim) = dimensions.get_mut(&dim_name) else {
            return;
        };
        let mut handler = dim.handler.take().expect("dimension handler");
        {
            let mut ctx = DimensionCtx {
                dim,
                conns,
                registry: shared.registry.as_ref(),
                transfers,
            };
            f(handler.as_mut(), &mut ctx, id);
        }
        dim.handler = Some(handler);
    }

    /// Player-level handlers run first and may consume the event; otherwise
    /// it delegates to the dimension handler.
    fn dispatch_player_event(&mut self, id: PlayerId, event: PlayerEvent) {
        let player_handler = self.conns.get_mut(&id).and_then(|c| c.handler.take());
        if let Some(mut handler) = player_handler {
            let result = {
                let Some(dim_name) = self.conns.get(&id).map(|c| c.dimension.clone()) else {
                    return;
                };
                let Self {
                    dimensions,
                    conns,
                    transfers,
                    shared,
                    ..
                } = self;
                let Some(dim) = dimensions.get_mut(&dim_name) else {
                    return;
                };
                let mut ctx = DimensionCtx {
                    dim,
                    conns,
                    registry: shared.registry.as_ref(),
                    transfers,
                };
                match &event {
                    PlayerEvent::Chat(message) => handler.on_chat_message(&mut ctx, id, message),
                    PlayerEvent::Command(command) => handler.on_command(&mut ctx, id, command),
                    PlayerEvent::SetSlot(slot, item) => {
                        handler.on_set_slot(&mut ctx, id, *slot, item.clone())
                    }
                    PlayerEvent::SelectSlot(slot) => {
                        handler.on_select_hotbar_slot(&mut ctx, id, *slot)
                    }
                }
            };
            if let Some(conn) = self.conns.get_mut(&id) {
                conn.handler = Some(handler);
            }
            if result == HandlerResult::Consumed {
                return;
            }
        }
        self.dispatch_dim(id, |handler, ctx, id| match event {
            PlayerEvent::Chat(message) => handler.on_chat_message(ctx, id, &message),
            PlayerEvent::Command(command) => handler.on_command(ctx, id, &command),
            PlayerEvent::SetSlot(slot, item) => handler.on_set_slot(ctx, id, slot, item),
            PlayerEvent::SelectSlot(slot) => handler.on_select_hotbar_slot(ctx, id, slot),
        });
    }

    // === Serverbound dispatch ===

    fn handle_packet(&mut self, id: PlayerId, packet: ServerboundPacket) {
        if !self.conns.contains_key(&id) {
            return;
        }
        match packet {
            ServerboundPacket::KeepAlive { id: echoed } => {
                let conn = self.conns.get_mut(&id).unwrap();
                if echoed == conn.keepalive_id {
                    conn.keepalive_received = true;
                } else {
                    debug!(
                        "stale keep-alive {} from {} (expected {})",
                        echoed, conn.profile.name, conn.keepalive_id
                    );
                }
            }
            ServerboundPacket::AcceptTeleportation { teleport_id } => {
                let conn = self.conns.get_mut(&id).unwrap();
                if teleport_id == conn.teleport_id {
                    conn.teleport_acked = true;
                }
            }
            ServerboundPacket::Chat { message, .. } => {
                self.dispatch_player_event(id, PlayerEvent::Chat(message));
            }
            ServerboundPacket::ChatCommand { command } => {
                self.dispatch_player_event(id, PlayerEvent::Command(command));
            }
            ServerboundPacket::ClientInformation {
                skin_parts,
                main_hand,
                ..
            } => {
                let conn = self.conns.get_mut(&id).unwrap();
                let skin = SkinSettings {
                    layers: skin_parts & 0x7F,
                    main_hand: if main_hand == 0 { 0 } else { 1 },
                };
                if skin != conn.skin {
                    conn.skin = skin;
                    let metadata = conn.metadata();
                    let entity_id = conn.entity_id;
                    let listeners = conn.listeners.clone();
                    conn.send(ClientboundPacket::SetEntityData {
                        entity_id: 0,
                        metadata: metadata.clone(),
                    });
                    for listener in listeners {
                        if let Some(peer) = self.conns.get(&listener) {
                            peer.send(ClientboundPacket::SetEntityData {
                                entity_id,
                                metadata: metadata.clone(),
                            });
                        }
                    }
                }
            }
            ServerboundPacket::CustomPayload { channel, .. } => {
                debug!("custom payload on {channel}");
            }
            ServerboundPacket::MovePlayerPos { position, flags } => {
                self.handle_move(id, Some(position), None, flags);
            }
            ServerboundPacket::MovePlayerPosRot {
                position,
                yaw,
                pitch,
                flags,
            } => {
                self.handle_move(id, Some(position), Some((yaw, pitch)), flags);
            }
            ServerboundPacket::MovePlayerRot { yaw, pitch, flags } => {
                self.handle_move(id, None, Some((yaw, pitch)), flags);
            }
            ServerboundPacket::MovePlayerStatusOnly { flags } => {
                self.handle_move(id, None, None, flags);
            }
            ServerboundPacket::PlayerCommand { action, .. } => {
                let conn = self.conns.get_mut(&id).unwrap();
                match action {
                    0 => conn.sneaking = true,
                    1 => conn.sneaking = false,
                    3 => conn.sprinting = true,
                    4 => conn.sprinting = false,
                    _ => return,
                }
                let metadata = conn.metadata();
                let entity_id = conn.entity_id;
                for listener in conn.listeners.clone() {
                    if let Some(peer) = self.conns.get(&listener) {
                        peer.send(ClientboundPacket::SetEntityData {
                            entity_id,
                            metadata: metadata.clone(),
                        });
                    }
                }
            }
            ServerboundPacket::PlayerAbilities { flags } => {
                debug!("player abilities flags: {flags:#x}");
            }
            ServerboundPacket::SetCarriedItem { slot } => {
                if !(0..=8).contains(&slot) {
                    return;
                }
                if let Some(conn) = self.conns.get_mut(&id) {
                    conn.selected_slot = slot as u8;
                }
                self.dispatch_player_event(id, PlayerEvent::SelectSlot(slot as u8));
            }
            ServerboundPacket::SetCreativeModeSlot { slot, item } => {
                if let Some(conn) = self.conns.get_mut(&id) {
                    match &item {
                        Some(stack) => {
                            conn.inventory.insert(slot, stack.clone());
                        }
                        None => {
                            conn.inventory.remove(&slot);
                        }
                    }
                }
                self.dispatch_player_event(id, PlayerEvent::SetSlot(slot, item));
            }
            ServerboundPacket::PlayerAction {
                action,
                position,
                sequence,
                ..
            } => {
                // Action 0 is "start destroy"; instant break for this core.
                if action == 0 {
                    self.dispatch_dim(id, |handler, ctx, id| {
                        handler.on_break_block(ctx, id, position);
                    });
                }
                if let Some(conn) = self.conns.get(&id) {
                    conn.send(ClientboundPacket::BlockChangedAck { sequence });
                }
            }
            ServerboundPacket::Swing { hand } => {
                let conn = &self.conns[&id];
                let packet = ClientboundPacket::Animate {
                    entity_id: conn.entity_id,
                    action: if hand == 0 { 0 } else { 3 },
                };
                for listener in conn.listeners.clone() {
                    if let Some(peer) = self.conns.get(&listener) {
                        peer.send(packet.clone());
                    }
                }
            }
            ServerboundPacket::UseItemOn {
                hand,
                position,
                face,
                sequence,
                ..
            } => {
                let hand = basalt_types::Hand::from_wire(hand);
                self.dispatch_dim(id, move |handler, ctx, id| {
                    handler.on_use_item_on_block(ctx, id, hand, position, face);
                });
                if let Some(conn) = self.conns.get(&id) {
                    conn.send(ClientboundPacket::BlockChangedAck { sequence });
                }
            }
            ServerboundPacket::UseItem { hand, sequence, .. } => {
                let hand = basalt_types::Hand::from_wire(hand);
                self.dispatch_dim(id, move |handler, ctx, id| {
                    handler.on_use_item(ctx, id, hand);
                });
                if let Some(conn) = self.conns.get(&id) {
                    conn.send(ClientboundPacket::BlockChangedAck { sequence });
                }
            }
            ServerboundPacket::PingRequest { payload } => {
                self.conns[&id].send(ClientboundPacket::PongResponse { payload });
            }
            // Housekeeping packets the core accepts and drops.
            ServerboundPacket::ChatAck
            | ServerboundPacket::ChatSessionUpdate
            | ServerboundPacket::ChunkBatchReceived { .. }
            | ServerboundPacket::ClientTickEnd
            | ServerboundPacket::PlayerInput { .. }
            | ServerboundPacket::PlayerLoaded => {}
            other => {
                debug!("unhandled play packet {:?}", other);
            }
        }
    }

    fn handle_move(
        &mut self,
        id: PlayerId,
        new_position: Option<Vec3d>,
        new_rotation: Option<(f32, f32)>,
        flags: u8,
    ) {
        let Some(conn) = self.conns.get_mut(&id) else {
            return;
        };
        // Movement before the pending teleport is acknowledged is stale.
        if !conn.teleport_acked {
            return;
        }
        conn.on_ground = flags & 0x01 != 0;
        conn.against_wall = flags & 0x02 != 0;
        if let Some((yaw, pitch)) = new_rotation {
            conn.yaw = wrap_yaw(yaw);
            conn.pitch = clamp_pitch(pitch);
        }
        let moved = match new_position {
            Some(position) => {
                conn.position = position;
                true
            }
            None => false,
        };

        if new_position.is_some() || new_rotation.is_some() {
            let update = ClientboundPacket::TeleportEntity {
                entity_id: conn.entity_id,
                position: conn.position,
                yaw: conn.yaw,
                pitch: conn.pitch,
                on_ground: conn.on_ground,
            };
            let head = ClientboundPacket::RotateHead {
                entity_id: conn.entity_id,
                head_yaw: angle_to_byte(conn.yaw),
            };
            for listener in conn.listeners.clone() {
                if let Some(peer) = self.conns.get(&listener) {
                    peer.send(update.clone());
                    peer.send(head.clone());
                }
            }
        }

        if moved {
            self.on_player_moved(id);
        }
    }

    fn on_player_moved(&mut self, id: PlayerId) {
        let (block_changed, chunk_changed, new_chunk) = {
            let Some(conn) = self.conns.get_mut(&id) else {
                return;
            };
            let new_block = conn.position.block_pos();
            if new_block == conn.block_shadow {
                return;
            }
            conn.block_shadow = new_block;
            let new_chunk = new_block.chunk_pos();
            (true, new_chunk != conn.chunk_shadow, new_chunk)
        };
        if block_changed {
            self.dispatch_dim(id, |handler, ctx, id| {
                handler.on_player_changed_position(ctx, id);
            });
        }
        if chunk_changed {
            let Some(dim_name) = self.conns.get(&id).map(|c| c.dimension.clone()) else {
                return;
            };
            let Self {
                dimensions, conns, ..
            } = self;
            let dim = dimensions.get_mut(&dim_name).expect("player dimension");
            let conn = conns.get_mut(&id).unwrap();
            Self::stream_chunks(dim, conn, new_chunk.x, new_chunk.z, false);
        }
    }

    // === Transfers ===

    fn process_transfers(&mut self) {
        let pending = std::mem::take(&mut self.transfers);
        for (id, dimension) in pending {
            self.transfer_player(id, dimension);
        }
    }

    fn transfer_player(&mut self, id: PlayerId, dimension: String) {
        if !self.dimensions.contains_key(&dimension) {
            warn!("transfer to unknown dimension {dimension}");
            return;
        }
        let Some(conn) = self.conns.get(&id) else {
            return;
        };
        if conn.dimension == dimension {
            return;
        }
        info!("{} transferring to {}", conn.profile.name, dimension);
        self.remove_from_dimension(id);

        let dim = &self.dimensions[&dimension];
        let respawn = ClientboundPacket::Respawn {
            dimension_type: dim.type_net_id,
            dimension_name: dim.id.clone(),
            hashed_seed: 0,
            game_mode: GameMode::Creative,
            is_flat: dim.is_flat,
            sea_level: dim.sea_level,
            data_kept: RESPAWN_DATA_KEPT,
        };
        let conn = self.conns.get_mut(&id).unwrap();
        conn.dimension = dimension;
        conn.send(respawn);

        self.add_player_to_dimension(id);
    }

    // === Timers ===

    fn start_keep_alive(&mut self, id: PlayerId) {
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.keepalive_id = 1;
            conn.keepalive_received = false;
            conn.next_keepalive = Instant::now() + KEEP_ALIVE_INTERVAL;
            conn.send(ClientboundPacket::KeepAlive { id: 1 });
        }
    }

    /// The 15-second keep-alive doubles as the liveness timeout: an id left
    /// unanswered for a full cycle disconnects the client.
    fn tick_keep_alive(&mut self) {
        let now = Instant::now();
        let mut timed_out = Vec::new();
        for (&id, conn) in self.conns.iter_mut() {
            if now < conn.next_keepalive {
                continue;
            }
            if !conn.keepalive_received {
                timed_out.push(id);
                continue;
            }
            conn.keepalive_id += 1;
            conn.keepalive_received = false;
            conn.next_keepalive = now + KEEP_ALIVE_INTERVAL;
            conn.send(ClientboundPacket::KeepAlive {
                id: conn.keepalive_id,
            });
        }
        for id in timed_out {
            self.drop_player(id, Some(TextComponent::translated("disconnect.timeout")));
        }
    }

    fn tick_dimensions(&mut self) {
        let names: Vec<String> = self.dimensions.keys().cloned().collect();
        for name in names {
            let Self {
                dimensions,
                conns,
                transfers,
                shared,
                ..
            } = self;
            let dim = dimensions.get_mut(&name).unwrap();
            let mut handler = dim.handler.take().expect("dimension handler");
            {
                let mut ctx = DimensionCtx {
                    dim,
                    conns,
                    registry: shared.registry.as_ref(),
                    transfers,
                };
                handler.on_tick(&mut ctx);
            }
            dim.handler = Some(handler);
        }
        self.process_transfers();
    }
}
