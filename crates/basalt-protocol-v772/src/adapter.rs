use anyhow::Result;
use basalt_nbt::NbtValue;
use basalt_protocol_core::*;
use basalt_types::TextComponent;
use bytes::{BufMut, BytesMut};

use crate::ids::*;

/// Protocol adapter for revision 772 (client 1.21.7/8).
pub struct V772Adapter;

impl V772Adapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for V772Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolAdapter for V772Adapter {
    fn protocol_version(&self) -> i32 {
        PROTOCOL_VERSION
    }

    fn version_name(&self) -> &'static str {
        VERSION_NAME
    }

    fn decode(
        &self,
        state: ConnectionState,
        id: i32,
        body: &mut BytesMut,
    ) -> Result<ServerboundPacket> {
        let packet = match state {
            ConnectionState::Handshake => decode_handshake(id, body),
            ConnectionState::Status => decode_status(id, body),
            ConnectionState::Login | ConnectionState::LoginWaitEncrypt | ConnectionState::LoginWaitAck => {
                decode_login(id, body)
            }
            ConnectionState::Configuration | ConnectionState::ConfigurationWaitAck => {
                decode_configuration(id, body)
            }
            ConnectionState::Play => decode_play(id, body),
            ConnectionState::Closed => None,
        };
        match packet {
            Some(result) => Ok(result?),
            None => Err(ProtocolError::UnexpectedPacket { state, id }.into()),
        }
    }

    fn encode(&self, state: ConnectionState, packet: &ClientboundPacket) -> Result<(i32, BytesMut)> {
        let encoded = match state {
            ConnectionState::Status => encode_status(packet),
            ConnectionState::Login | ConnectionState::LoginWaitEncrypt | ConnectionState::LoginWaitAck => {
                encode_login(packet)
            }
            ConnectionState::Configuration | ConnectionState::ConfigurationWaitAck => {
                encode_configuration(packet)
            }
            ConnectionState::Play => encode_play(packet),
            ConnectionState::Handshake | ConnectionState::Closed => None,
        };
        encoded.ok_or_else(|| ProtocolError::BadEncodeState(state).into())
    }
}

// === Decode ===

type Decoded = Option<CodecResult<ServerboundPacket>>;

fn decode_handshake(id: i32, data: &mut BytesMut) -> Decoded {
    match id {
        handshake_sb::INTENTION => Some((|| {
            Ok(ServerboundPacket::Intention {
                protocol_version: read_varint(data)?,
                server_address: read_string(data, 255)?,
                server_port: read_u16(data)?,
                next_state: read_varint(data)?,
            })
        })()),
        _ => None,
    }
}

fn decode_status(id: i32, data: &mut BytesMut) -> Decoded {
    match id {
        status_sb::STATUS_REQUEST => Some(Ok(ServerboundPacket::StatusRequest)),
        status_sb::PING_REQUEST => Some(read_i64(data).map(|payload| ServerboundPacket::PingRequest { payload })),
        _ => None,
    }
}

fn decode_login(id: i32, data: &mut BytesMut) -> Decoded {
    match id {
        login_sb::HELLO => Some((|| {
            Ok(ServerboundPacket::Hello {
                name: read_string(data, 16)?,
                uuid: read_uuid(data)?,
            })
        })()),
        login_sb::KEY => Some((|| {
            Ok(ServerboundPacket::Key {
                encrypted_shared_secret: read_byte_array(data)?,
                encrypted_verify_token: read_byte_array(data)?,
            })
        })()),
        login_sb::LOGIN_ACKNOWLEDGED => Some(Ok(ServerboundPacket::LoginAcknowledged)),
        _ => None,
    }
}

fn decode_client_information(data: &mut BytesMut) -> CodecResult<ServerboundPacket> {
    Ok(ServerboundPacket::ClientInformation {
        locale: read_string(data, 16)?,
        view_distance: read_i8(data)?,
        chat_mode: read_varint(data)?,
        chat_colors: read_bool(data)?,
        skin_parts: read_u8(data)?,
        main_hand: read_varint(data)?,
        text_filtering: read_bool(data)?,
        allow_listing: read_bool(data)?,
        // The trailing particle-status varint is drained with the body.
    })
}

fn decode_custom_payload(data: &mut BytesMut) -> CodecResult<ServerboundPacket> {
    Ok(ServerboundPacket::CustomPayload {
        channel: read_string(data, 32767)?,
        data: read_remaining(data),
    })
}

fn decode_configuration(id: i32, data: &mut BytesMut) -> Decoded {
    match id {
        config_sb::CLIENT_INFORMATION => Some(decode_client_information(data)),
        config_sb::CUSTOM_PAYLOAD => Some(decode_custom_payload(data)),
        config_sb::FINISH_CONFIGURATION => Some(Ok(ServerboundPacket::FinishConfiguration)),
        config_sb::SELECT_KNOWN_PACKS => Some((|| {
            let count = read_varint(data)? as usize;
            let mut packs = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                packs.push(KnownPack {
                    namespace: read_string(data, 256)?,
                    id: read_string(data, 256)?,
                    version: read_string(data, 256)?,
                });
            }
            Ok(ServerboundPacket::SelectKnownPacks { packs })
        })()),
        _ => None,
    }
}

fn decode_play(id: i32, data: &mut BytesMut) -> Decoded {
    let result = match id {
        play_sb::ACCEPT_TELEPORTATION => {
            read_varint(data).map(|teleport_id| ServerboundPacket::AcceptTeleportation { teleport_id })
        }
        play_sb::CHAT_ACK => Ok(ServerboundPacket::ChatAck),
        play_sb::CHAT_COMMAND => {
            read_string(data, 32767).map(|command| ServerboundPacket::ChatCommand { command })
        }
        play_sb::CHAT => (|| {
            let message = read_string(data, 256)?;
            let timestamp = read_i64(data)?;
            let salt = read_i64(data)?;
            let signature = if read_bool(data)? {
                Some(read_bytes(data, 256)?)
            } else {
                None
            };
            // The acknowledgment bitset and checksum drain with the body.
            Ok(ServerboundPacket::Chat {
                message,
                timestamp,
                salt,
                signature,
            })
        })(),
        play_sb::CHAT_SESSION_UPDATE => Ok(ServerboundPacket::ChatSessionUpdate),
        play_sb::CHUNK_BATCH_RECEIVED => {
            read_f32(data).map(|chunks_per_tick| ServerboundPacket::ChunkBatchReceived { chunks_per_tick })
        }
        play_sb::CLIENT_TICK_END => Ok(ServerboundPacket::ClientTickEnd),
        play_sb::CLIENT_INFORMATION => decode_client_information(data),
        play_sb::CUSTOM_PAYLOAD => decode_custom_payload(data),
        play_sb::KEEP_ALIVE => read_i64(data).map(|id| ServerboundPacket::KeepAlive { id }),
        play_sb::MOVE_PLAYER_POS => (|| {
            let position = read_vec3d(data)?;
            let flags = read_u8(data)?;
            Ok(ServerboundPacket::MovePlayerPos { position, flags })
        })(),
        play_sb::MOVE_PLAYER_POS_ROT => (|| {
            let position = read_vec3d(data)?;
            let yaw = read_f32(data)?;
            let pitch = read_f32(data)?;
            let flags = read_u8(data)?;
            Ok(ServerboundPacket::MovePlayerPosRot {
                position,
                yaw,
                pitch,
                flags,
            })
        })(),
        play_sb::MOVE_PLAYER_ROT => (|| {
            let yaw = read_f32(data)?;
            let pitch = read_f32(data)?;
            let flags = read_u8(data)?;
            Ok(ServerboundPacket::MovePlayerRot { yaw, pitch, flags })
        })(),
        play_sb::MOVE_PLAYER_STATUS_ONLY => {
            read_u8(data).map(|flags| ServerboundPacket::MovePlayerStatusOnly { flags })
        }
        play_sb::PING_REQUEST => read_i64(data).map(|payload| ServerboundPacket::PingRequest { payload }),
        play_sb::PLAYER_ABILITIES => read_u8(data).map(|flags| ServerboundPacket::PlayerAbilities { flags }),
        play_sb::PLAYER_ACTION => (|| {
            let action = read_varint(data)?;
            let position = read_position(data)?;
            let face = read_u8(data)?;
            let sequence = read_varint(data)?;
            Ok(ServerboundPacket::PlayerAction {
                action,
                position,
                face,
                sequence,
            })
        })(),
        play_sb::PLAYER_COMMAND => (|| {
            let entity_id = read_varint(data)?;
            let action = read_varint(data)?;
            let data_field = read_varint(data)?;
            Ok(ServerboundPacket::PlayerCommand {
                entity_id,
                action,
                data: data_field,
            })
        })(),
        play_sb::PLAYER_INPUT => read_u8(data).map(|flags| ServerboundPacket::PlayerInput { flags }),
        play_sb::PLAYER_LOADED => Ok(ServerboundPacket::PlayerLoaded),
        play_sb::SET_CARRIED_ITEM => read_i16(data).map(|slot| ServerboundPacket::SetCarriedItem { slot }),
        play_sb::SET_CREATIVE_MODE_SLOT => (|| {
            let slot = read_i16(data)?;
            let item = read_slot(data)?;
            Ok(ServerboundPacket::SetCreativeModeSlot { slot, item })
        })(),
        play_sb::SWING => read_varint(data).map(|hand| ServerboundPacket::Swing { hand }),
        play_sb::USE_ITEM_ON => (|| {
            let hand = read_varint(data)?;
            let position = read_position(data)?;
            let face = read_varint(data)? as u8;
            let cursor_x = read_f32(data)?;
            let cursor_y = read_f32(data)?;
            let cursor_z = read_f32(data)?;
            let inside_block = read_bool(data)?;
            let world_border_hit = read_bool(data)?;
            let sequence = read_varint(data)?;
            Ok(ServerboundPacket::UseItemOn {
                hand,
                position,
                face,
                cursor_x,
                cursor_y,
                cursor_z,
                inside_block,
                world_border_hit,
                sequence,
            })
        })(),
        play_sb::USE_ITEM => (|| {
            let hand = read_varint(data)?;
            let sequence = read_varint(data)?;
            let yaw = read_f32(data)?;
            let pitch = read_f32(data)?;
            Ok(ServerboundPacket::UseItem {
                hand,
                sequence,
                yaw,
                pitch,
            })
        })(),
        _ => return None,
    };
    Some(result)
}

fn read_vec3d(data: &mut BytesMut) -> CodecResult<basalt_types::Vec3d> {
    Ok(basalt_types::Vec3d::new(
        read_f64(data)?,
        read_f64(data)?,
        read_f64(data)?,
    ))
}

// === Encode ===

type Encoded = Option<(i32, BytesMut)>;

fn encode_status(packet: &ClientboundPacket) -> Encoded {
    let mut buf = BytesMut::new();
    let id = match packet {
        ClientboundPacket::StatusResponse { json } => {
            write_string(&mut buf, json);
            status_cb::STATUS_RESPONSE
        }
        ClientboundPacket::PongResponse { payload } => {
            buf.put_i64(*payload);
            status_cb::PONG_RESPONSE
        }
        _ => return None,
    };
    Some((id, buf))
}

fn encode_login(packet: &ClientboundPacket) -> Encoded {
    let mut buf = BytesMut::new();
    let id = match packet {
        ClientboundPacket::Disconnect { reason } => {
            // Login-phase disconnects carry the component as JSON.
            write_string(&mut buf, &reason.to_json());
            login_cb::LOGIN_DISCONNECT
        }
        ClientboundPacket::Hello {
            server_id,
            public_key,
            verify_token,
            should_authenticate,
        } => {
            write_string(&mut buf, server_id);
            write_byte_array(&mut buf, public_key);
            write_byte_array(&mut buf, verify_token);
            buf.put_u8(*should_authenticate as u8);
            login_cb::HELLO
        }
        ClientboundPacket::LoginFinished { profile } => {
            write_uuid(&mut buf, &profile.uuid);
            write_string(&mut buf, &profile.name);
            write_varint(&mut buf, profile.properties.len() as i32);
            for prop in &profile.properties {
                write_string(&mut buf, &prop.name);
                write_string(&mut buf, &prop.value);
                match &prop.signature {
                    Some(sig) => {
                        buf.put_u8(1);
                        write_string(&mut buf, sig);
                    }
                    None => buf.put_u8(0),
                }
            }
            login_cb::LOGIN_FINISHED
        }
        _ => return None,
    };
    Some((id, buf))
}

fn encode_configuration(packet: &ClientboundPacket) -> Encoded {
    let mut buf = BytesMut::new();
    let id = match packet {
        ClientboundPacket::CustomPayload { channel, data } => {
            write_string(&mut buf, channel);
            buf.put_slice(data);
            config_cb::CUSTOM_PAYLOAD
        }
        ClientboundPacket::Disconnect { reason } => {
            write_nbt_component(&mut buf, reason);
            config_cb::DISCONNECT
        }
        ClientboundPacket::FinishConfiguration => config_cb::FINISH_CONFIGURATION,
        ClientboundPacket::RegistryData { body } => {
            buf.put_slice(body);
            config_cb::REGISTRY_DATA
        }
        ClientboundPacket::UpdateTags { body } => {
            buf.put_slice(body);
            config_cb::UPDATE_TAGS
        }
        ClientboundPacket::UpdateEnabledFeatures { features } => {
            write_varint(&mut buf, features.len() as i32);
            for feature in features {
                write_string(&mut buf, feature);
            }
            config_cb::UPDATE_ENABLED_FEATURES
        }
        ClientboundPacket::SelectKnownPacks { packs } => {
            write_varint(&mut buf, packs.len() as i32);
            for pack in packs {
                write_string(&mut buf, &pack.namespace);
                write_string(&mut buf, &pack.id);
                write_string(&mut buf, &pack.version);
            }
            config_cb::SELECT_KNOWN_PACKS
        }
        ClientboundPacket::CustomReportDetails { details } => {
            write_varint(&mut buf, details.len() as i32);
            for (title, description) in details {
                write_string(&mut buf, title);
                write_string(&mut buf, description);
            }
            config_cb::CUSTOM_REPORT_DETAILS
        }
        ClientboundPacket::ServerLinks { links } => {
            write_varint(&mut buf, links.len() as i32);
            for (label, url) in links {
                buf.put_u8(1); // built-in label
                write_varint(&mut buf, *label);
                write_string(&mut buf, url);
            }
            config_cb::SERVER_LINKS
        }
        _ => return None,
    };
    Some((id, buf))
}

fn encode_play(packet: &ClientboundPacket) -> Encoded {
    let mut buf = BytesMut::new();
    let id = match packet {
        ClientboundPacket::Disconnect { reason } => {
            write_nbt_component(&mut buf, reason);
            play_cb::DISCONNECT
        }
        ClientboundPacket::CustomPayload { channel, data } => {
            write_string(&mut buf, channel);
            buf.put_slice(data);
            play_cb::CUSTOM_PAYLOAD
        }
        ClientboundPacket::KeepAlive { id } => {
            buf.put_i64(*id);
            play_cb::KEEP_ALIVE
        }
        ClientboundPacket::PongResponse { payload } => {
            buf.put_i64(*payload);
            play_cb::PONG_RESPONSE
        }
        ClientboundPacket::Login {
            entity_id,
            dimension_names,
            max_players,
            view_distance,
            simulation_distance,
            dimension_type,
            dimension_name,
            hashed_seed,
            game_mode,
            is_flat,
            sea_level,
            enforces_secure_chat,
        } => {
            buf.put_i32(*entity_id);
            buf.put_u8(0); // hardcore
            write_varint(&mut buf, dimension_names.len() as i32);
            for name in dimension_names {
                write_string(&mut buf, name);
            }
            write_varint(&mut buf, *max_players);
            write_varint(&mut buf, *view_distance);
            write_varint(&mut buf, *simulation_distance);
            buf.put_u8(0); // reduced debug info
            buf.put_u8(1); // enable respawn screen
            buf.put_u8(0); // do limited crafting
            write_varint(&mut buf, *dimension_type);
            write_string(&mut buf, dimension_name);
            buf.put_i64(*hashed_seed);
            buf.put_u8(game_mode.id());
            buf.put_i8(-1); // previous game mode
            buf.put_u8(0); // is debug
            buf.put_u8(*is_flat as u8);
            buf.put_u8(0); // has death location
            write_varint(&mut buf, 0); // portal cooldown
            write_varint(&mut buf, *sea_level);
            buf.put_u8(*enforces_secure_chat as u8);
            play_cb::LOGIN
        }
        ClientboundPacket::GameEvent { event, value } => {
            buf.put_u8(*event);
            buf.put_f32(*value);
            play_cb::GAME_EVENT
        }
        ClientboundPacket::PlayerPosition {
            teleport_id,
            position,
            yaw,
            pitch,
        } => {
            write_varint(&mut buf, *teleport_id);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
            buf.put_f64(position.z);
            // Velocity is always zeroed for synchronization.
            buf.put_f64(0.0);
            buf.put_f64(0.0);
            buf.put_f64(0.0);
            buf.put_f32(*yaw);
            buf.put_f32(*pitch);
            buf.put_i32(0); // all absolute
            play_cb::PLAYER_POSITION
        }
        ClientboundPacket::SetChunkCacheCenter { chunk_x, chunk_z } => {
            write_varint(&mut buf, *chunk_x);
            write_varint(&mut buf, *chunk_z);
            play_cb::SET_CHUNK_CACHE_CENTER
        }
        ClientboundPacket::SetDefaultSpawnPosition { position, angle } => {
            write_position(&mut buf, position);
            buf.put_f32(*angle);
            play_cb::SET_DEFAULT_SPAWN_POSITION
        }
        ClientboundPacket::ChunkBatchStart => play_cb::CHUNK_BATCH_START,
        ClientboundPacket::ChunkBatchFinished { batch_size } => {
            write_varint(&mut buf, *batch_size);
            play_cb::CHUNK_BATCH_FINISHED
        }
        ClientboundPacket::LevelChunkWithLight {
            chunk_x,
            chunk_z,
            heightmaps,
            data,
        } => {
            buf.put_i32(*chunk_x);
            buf.put_i32(*chunk_z);
            write_varint(&mut buf, heightmaps.len() as i32);
            for (kind, longs) in heightmaps {
                write_varint(&mut buf, *kind);
                write_varint(&mut buf, longs.len() as i32);
                for long in longs {
                    buf.put_i64(*long);
                }
            }
            write_varint(&mut buf, data.len() as i32);
            buf.put_slice(data);
            write_varint(&mut buf, 0); // block entities
            // Empty light masks and arrays; the client computes its own.
            for _ in 0..4 {
                write_varint(&mut buf, 0);
            }
            write_varint(&mut buf, 0); // sky light arrays
            write_varint(&mut buf, 0); // block light arrays
            play_cb::LEVEL_CHUNK_WITH_LIGHT
        }
        ClientboundPacket::ForgetLevelChunk { chunk_x, chunk_z } => {
            buf.put_i32(*chunk_z);
            buf.put_i32(*chunk_x);
            play_cb::FORGET_LEVEL_CHUNK
        }
        ClientboundPacket::BlockUpdate { position, state_id } => {
            write_position(&mut buf, position);
            write_varint(&mut buf, *state_id);
            play_cb::BLOCK_UPDATE
        }
        ClientboundPacket::BlockChangedAck { sequence } => {
            write_varint(&mut buf, *sequence);
            play_cb::BLOCK_CHANGED_ACK
        }
        ClientboundPacket::SystemChat { content, overlay } => {
            write_nbt_component(&mut buf, content);
            buf.put_u8(*overlay as u8);
            play_cb::SYSTEM_CHAT
        }
        ClientboundPacket::DisguisedChat {
            message,
            chat_type,
            sender_name,
        } => {
            write_nbt_component(&mut buf, message);
            // Holder: id + 1; zero would mean an inline definition.
            write_varint(&mut buf, *chat_type + 1);
            write_nbt_component(&mut buf, sender_name);
            buf.put_u8(0); // no target name
            play_cb::DISGUISED_CHAT
        }
        ClientboundPacket::PlayerInfoUpdate { actions, players } => {
            buf.put_u8(*actions);
            write_varint(&mut buf, players.len() as i32);
            for entry in players {
                write_uuid(&mut buf, &entry.uuid);
                if actions & player_info_actions::ADD_PLAYER != 0 {
                    write_string(&mut buf, entry.name.as_deref().unwrap_or(""));
                    write_varint(&mut buf, entry.properties.len() as i32);
                    for (name, value, signature) in &entry.properties {
                        write_string(&mut buf, name);
                        write_string(&mut buf, value);
                        match signature {
                            Some(sig) => {
                                buf.put_u8(1);
                                write_string(&mut buf, sig);
                            }
                            None => buf.put_u8(0),
                        }
                    }
                }
                if actions & player_info_actions::INITIALIZE_CHAT != 0 {
                    buf.put_u8(0); // no chat session
                }
                if actions & player_info_actions::UPDATE_GAME_MODE != 0 {
                    write_varint(&mut buf, entry.game_mode.unwrap_or(0));
                }
                if actions & player_info_actions::UPDATE_LISTED != 0 {
                    buf.put_u8(entry.listed.unwrap_or(true) as u8);
                }
                if actions & player_info_actions::UPDATE_LATENCY != 0 {
                    write_varint(&mut buf, entry.ping.unwrap_or(0));
                }
            }
            play_cb::PLAYER_INFO_UPDATE
        }
        ClientboundPacket::PlayerInfoRemove { uuids } => {
            write_varint(&mut buf, uuids.len() as i32);
            for uuid in uuids {
                write_uuid(&mut buf, uuid);
            }
            play_cb::PLAYER_INFO_REMOVE
        }
        ClientboundPacket::AddEntity {
            entity_id,
            entity_uuid,
            entity_type,
            position,
            pitch,
            yaw,
            head_yaw,
            data,
        } => {
            write_varint(&mut buf, *entity_id);
            write_uuid(&mut buf, entity_uuid);
            write_varint(&mut buf, *entity_type);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
            buf.put_f64(position.z);
            buf.put_u8(*pitch);
            buf.put_u8(*yaw);
            buf.put_u8(*head_yaw);
            write_varint(&mut buf, *data);
            buf.put_i16(0); // velocity
            buf.put_i16(0);
            buf.put_i16(0);
            play_cb::ADD_ENTITY
        }
        ClientboundPacket::RemoveEntities { entity_ids } => {
            write_varint(&mut buf, entity_ids.len() as i32);
            for id in entity_ids {
                write_varint(&mut buf, *id);
            }
            play_cb::REMOVE_ENTITIES
        }
        ClientboundPacket::TeleportEntity {
            entity_id,
            position,
            yaw,
            pitch,
            on_ground,
        } => {
            write_varint(&mut buf, *entity_id);
            buf.put_f64(position.x);
            buf.put_f64(position.y);
            buf.put_f64(position.z);
            buf.put_f64(0.0); // velocity
            buf.put_f64(0.0);
            buf.put_f64(0.0);
            buf.put_f32(*yaw);
            buf.put_f32(*pitch);
            buf.put_u8(*on_ground as u8);
            play_cb::ENTITY_POSITION_SYNC
        }
        ClientboundPacket::RotateHead {
            entity_id,
            head_yaw,
        } => {
            write_varint(&mut buf, *entity_id);
            buf.put_u8(*head_yaw);
            play_cb::ROTATE_HEAD
        }
        ClientboundPacket::SetEntityData {
            entity_id,
            metadata,
        } => {
            write_varint(&mut buf, *entity_id);
            for entry in metadata {
                buf.put_u8(entry.index);
                write_varint(&mut buf, entry.kind);
                buf.put_slice(&entry.data);
            }
            buf.put_u8(0xFF); // terminator
            play_cb::SET_ENTITY_DATA
        }
        ClientboundPacket::Animate { entity_id, action } => {
            write_varint(&mut buf, *entity_id);
            buf.put_u8(*action);
            play_cb::ANIMATE
        }
        ClientboundPacket::Respawn {
            dimension_type,
            dimension_name,
            hashed_seed,
            game_mode,
            is_flat,
            sea_level,
            data_kept,
        } => {
            write_varint(&mut buf, *dimension_type);
            write_string(&mut buf, dimension_name);
            buf.put_i64(*hashed_seed);
            buf.put_u8(game_mode.id());
            buf.put_i8(-1); // previous game mode
            buf.put_u8(0); // is debug
            buf.put_u8(*is_flat as u8);
            buf.put_u8(0); // has death location
            write_varint(&mut buf, 0); // portal cooldown
            write_varint(&mut buf, *sea_level);
            buf.put_u8(*data_kept);
            play_cb::RESPAWN
        }
        _ => return None,
    };
    Some((id, buf))
}

/// Write a text component in its network NBT form.
fn write_nbt_component(buf: &mut BytesMut, component: &TextComponent) {
    component_to_nbt(component).write_root_network(buf);
}

fn component_to_nbt(component: &TextComponent) -> NbtValue {
    let mut entries: Vec<(String, NbtValue)> = Vec::new();
    if let Some(text) = &component.text {
        entries.push(("text".into(), NbtValue::String(text.clone())));
    }
    if let Some(translate) = &component.translate {
        entries.push(("translate".into(), NbtValue::String(translate.clone())));
    }
    if let Some(color) = &component.color {
        entries.push(("color".into(), NbtValue::String(color.clone())));
    }
    if let Some(bold) = component.bold {
        entries.push(("bold".into(), NbtValue::Byte(bold as i8)));
    }
    if let Some(italic) = component.italic {
        entries.push(("italic".into(), NbtValue::Byte(italic as i8)));
    }
    if !component.extra.is_empty() {
        entries.push((
            "extra".into(),
            NbtValue::List(component.extra.iter().map(component_to_nbt).collect()),
        ));
    }
    NbtValue::Compound(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_types::Vec3d;

    #[test]
    fn test_unknown_id_is_fatal() {
        let adapter = V772Adapter::new();
        let mut body = BytesMut::new();
        let err = adapter
            .decode(ConnectionState::Play, 0x7F, &mut body)
            .unwrap_err();
        let proto = err.downcast_ref::<ProtocolError>().unwrap();
        assert_eq!(
            *proto,
            ProtocolError::UnexpectedPacket {
                state: ConnectionState::Play,
                id: 0x7F
            }
        );
    }

    #[test]
    fn test_wait_ack_states_share_login_table() {
        let adapter = V772Adapter::new();
        let mut body = BytesMut::new();
        let packet = adapter
            .decode(ConnectionState::LoginWaitAck, login_sb::LOGIN_ACKNOWLEDGED, &mut body)
            .unwrap();
        assert!(matches!(packet, ServerboundPacket::LoginAcknowledged));
    }

    #[test]
    fn test_decode_intention() {
        let adapter = V772Adapter::new();
        let mut body = BytesMut::new();
        write_varint(&mut body, 772);
        write_string(&mut body, "localhost");
        body.put_u16(25565);
        write_varint(&mut body, 2);
        let packet = adapter
            .decode(ConnectionState::Handshake, handshake_sb::INTENTION, &mut body)
            .unwrap();
        match packet {
            ServerboundPacket::Intention {
                protocol_version,
                server_address,
                server_port,
                next_state,
            } => {
                assert_eq!(protocol_version, 772);
                assert_eq!(server_address, "localhost");
                assert_eq!(server_port, 25565);
                assert_eq!(next_state, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_move_player_pos() {
        let adapter = V772Adapter::new();
        let mut body = BytesMut::new();
        body.put_f64(1.5);
        body.put_f64(-60.0);
        body.put_f64(8.25);
        body.put_u8(0x01);
        let packet = adapter
            .decode(ConnectionState::Play, play_sb::MOVE_PLAYER_POS, &mut body)
            .unwrap();
        match packet {
            ServerboundPacket::MovePlayerPos { position, flags } => {
                assert_eq!(position, Vec3d::new(1.5, -60.0, 8.25));
                assert_eq!(flags, 0x01);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_encode_pong_per_state() {
        let adapter = V772Adapter::new();
        let packet = ClientboundPacket::PongResponse { payload: 0x0102030405060708 };
        let (status_id, status_body) = adapter.encode(ConnectionState::Status, &packet).unwrap();
        let (play_id, play_body) = adapter.encode(ConnectionState::Play, &packet).unwrap();
        assert_eq!(status_id, status_cb::PONG_RESPONSE);
        assert_eq!(play_id, play_cb::PONG_RESPONSE);
        // Same 8-byte opaque payload either way.
        assert_eq!(&status_body[..], &play_body[..]);
        assert_eq!(status_body.len(), 8);
    }

    #[test]
    fn test_encode_disconnect_json_vs_nbt() {
        let adapter = V772Adapter::new();
        let packet = ClientboundPacket::Disconnect {
            reason: TextComponent::translated("disconnect.timeout"),
        };
        let (_, login_body) = adapter.encode(ConnectionState::Login, &packet).unwrap();
        // Login form is a varint-prefixed JSON string.
        let mut body = login_body.clone();
        let json = read_string(&mut body, 32767).unwrap();
        assert_eq!(json, r#"{"translate":"disconnect.timeout"}"#);

        let (_, play_body) = adapter.encode(ConnectionState::Play, &packet).unwrap();
        // Play form is nameless-root NBT.
        let (nbt, _) = basalt_nbt::parse_root_network(&play_body).unwrap();
        assert_eq!(
            nbt.get("translate").and_then(|v| v.as_str()),
            Some("disconnect.timeout")
        );
    }

    #[test]
    fn test_entity_data_terminator() {
        let adapter = V772Adapter::new();
        let packet = ClientboundPacket::SetEntityData {
            entity_id: 5,
            metadata: vec![MetadataEntry::byte(metadata_index::SHARED_FLAGS, 0x02)],
        };
        let (id, body) = adapter.encode(ConnectionState::Play, &packet).unwrap();
        assert_eq!(id, play_cb::SET_ENTITY_DATA);
        assert_eq!(body.last(), Some(&0xFF));
    }
}
