use crate::auth::{self, SessionVerdict};
use crate::handler::{LoginDecision, StatusCtx};
use crate::player::{InboundEvent, NewPlayer, SkinSettings};
use crate::server::ServerShared;
use anyhow::{anyhow, bail, Context, Result};
use basalt_protocol_core::{
    legacy_status_response, write_string, ClientboundPacket, Connection, ConnectionReader,
    ConnectionWriter, Frame, HandshakeIntent, KnownPack, ProtocolAdapter, ProtocolError,
    ConnectionState, ServerboundPacket,
};
use basalt_types::{GameProfile, TextComponent};
use bytes::BytesMut;
use rsa::Pkcs1v15Encrypt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drive one client connection from handshake up to the play hand-off.
pub(crate) async fn handle_connection(stream: TcpStream, shared: Arc<ServerShared>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    let conn = Connection::new(stream);
    if let Err(e) = drive(conn, &shared, &peer).await {
        debug!("connection {} ended: {e:#}", peer);
    }
}

async fn drive(mut conn: Connection, shared: &Arc<ServerShared>, peer: &str) -> Result<()> {
    let adapter = &shared.adapter;

    let (id, mut body) = match conn.read_frame().await? {
        Frame::LegacyPing {
            protocol,
            address,
            port,
        } => {
            debug!(
                "legacy ping from {peer} (protocol {:?}, {:?}:{:?})",
                protocol, address, port
            );
            let response = legacy_status_response(
                adapter.protocol_version(),
                adapter.version_name(),
                &shared.properties.motd,
                shared.player_count.load(Ordering::Relaxed),
                shared.properties.max_players as usize,
            );
            conn.write_raw(&response).await?;
            return Ok(());
        }
        Frame::Packet { id, body } => (id, body),
    };

    let packet = adapter.decode(ConnectionState::Handshake, id, &mut body)?;
    let ServerboundPacket::Intention {
        protocol_version,
        next_state,
        ..
    } = packet
    else {
        bail!("handshake decoded to an unexpected packet");
    };
    debug!("handshake from {peer}: protocol={protocol_version}, next_state={next_state}");

    match HandshakeIntent::from_wire(next_state) {
        HandshakeIntent::Status => run_status(&mut conn, shared).await,
        HandshakeIntent::Login => {
            if protocol_version != adapter.protocol_version() {
                warn!(
                    "{peer} speaks protocol {protocol_version}, expected {}",
                    adapter.protocol_version()
                );
                return disconnect(
                    &mut conn,
                    shared,
                    ConnectionState::Login,
                    TextComponent::translated("multiplayer.disconnect.outdated_client"),
                )
                .await;
            }
            run_login(conn, shared, peer).await
        }
        HandshakeIntent::Transfer => {
            disconnect(
                &mut conn,
                shared,
                ConnectionState::Login,
                TextComponent::translated("multiplayer.disconnect.transfers_disabled"),
            )
            .await
        }
    }
}

async fn run_status(conn: &mut Connection, shared: &Arc<ServerShared>) -> Result<()> {
    loop {
        let frame = match conn.read_frame().await {
            Ok(frame) => frame,
            // The client hanging up after the ping is the normal ending.
            Err(_) => return Ok(()),
        };
        let Frame::Packet { id, mut body } = frame else {
            return Ok(());
        };
        match shared.adapter.decode(ConnectionState::Status, id, &mut body)? {
            ServerboundPacket::StatusRequest => {
                let ctx = StatusCtx {
                    online: shared.player_count.load(Ordering::Relaxed),
                    max: shared.properties.max_players,
                    motd: shared.properties.motd.clone(),
                    version_name: shared.adapter.version_name(),
                    protocol: shared.adapter.protocol_version(),
                };
                let json = shared.handler.status(&ctx).to_json();
                send(conn, shared, ConnectionState::Status, &ClientboundPacket::StatusResponse { json })
                    .await?;
            }
            ServerboundPacket::PingRequest { payload } => {
                send(
                    conn,
                    shared,
                    ConnectionState::Status,
                    &ClientboundPacket::PongResponse { payload },
                )
                .await?;
            }
            _ => {}
        }
    }
}

async fn run_login(mut conn: Connection, shared: &Arc<ServerShared>, peer: &str) -> Result<()> {
    let mut state = ConnectionState::Login;
    let (id, packet) = read_packet(&mut conn, shared, state).await?;
    let ServerboundPacket::Hello {
        name,
        uuid: client_uuid,
    } = packet
    else {
        bail!(ProtocolError::UnexpectedPacket { state, id });
    };
    info!("login start from {name} ({client_uuid}) at {peer}");

    let profile = if !shared.properties.online_mode {
        let uuid = Uuid::new_v4();
        match shared.handler.on_login(&name, None) {
            LoginDecision::Deny(reason) => return disconnect(&mut conn, shared, state, reason).await,
            LoginDecision::Allow => {}
        }
        GameProfile::offline(uuid, name)
    } else {
        let verify_token: [u8; 4] = rand::random();
        send(
            &mut conn,
            shared,
            state,
            &ClientboundPacket::Hello {
                server_id: String::new(),
                public_key: shared.public_key_der.clone(),
                verify_token: verify_token.to_vec(),
                should_authenticate: true,
            },
        )
        .await?;
        state = ConnectionState::LoginWaitEncrypt;

        let (id, packet) = read_packet(&mut conn, shared, state).await?;
        let ServerboundPacket::Key {
            encrypted_shared_secret,
            encrypted_verify_token,
        } = packet
        else {
            bail!(ProtocolError::UnexpectedPacket { state, id });
        };

        let key = shared
            .rsa_key
            .as_ref()
            .context("online mode without an RSA key")?;
        let secret = key
            .decrypt(Pkcs1v15Encrypt, &encrypted_shared_secret)
            .context("failed to decrypt shared secret")?;
        let token = key
            .decrypt(Pkcs1v15Encrypt, &encrypted_verify_token)
            .context("failed to decrypt verify token")?;
        if token != verify_token {
            bail!("verify token mismatch");
        }
        let secret: [u8; 16] = secret
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("shared secret must be 16 bytes"))?;
        conn.enable_encryption(&secret);

        let digest = auth::server_id_digest(&secret, &shared.public_key_der);
        match auth::has_joined(&name, &digest).await {
            SessionVerdict::Verified(profile) => {
                match shared.handler.on_login(&profile.name, Some(profile.uuid)) {
                    LoginDecision::Deny(reason) => {
                        return disconnect(&mut conn, shared, state, reason).await
                    }
                    LoginDecision::Allow => {}
                }
                profile
            }
            SessionVerdict::Rejected => {
                return disconnect(
                    &mut conn,
                    shared,
                    state,
                    TextComponent::plain("Authentication failed"),
                )
                .await
            }
            SessionVerdict::Unavailable => {
                return disconnect(
                    &mut conn,
                    shared,
                    state,
                    TextComponent::translated("disconnect.loginFailedInfo.serversUnavailable"),
                )
                .await
            }
        }
    };

    send(
        &mut conn,
        shared,
        state,
        &ClientboundPacket::LoginFinished {
            profile: profile.clone(),
        },
    )
    .await?;
    state = ConnectionState::LoginWaitAck;

    let (id, packet) = read_packet(&mut conn, shared, state).await?;
    if !matches!(packet, ServerboundPacket::LoginAcknowledged) {
        bail!(ProtocolError::UnexpectedPacket { state, id });
    }

    run_configuration(conn, shared, profile).await
}

async fn run_configuration(
    mut conn: Connection,
    shared: &Arc<ServerShared>,
    profile: GameProfile,
) -> Result<()> {
    let mut state = ConnectionState::Configuration;

    let mut brand = BytesMut::new();
    write_string(&mut brand, &shared.properties.brand);
    send(
        &mut conn,
        shared,
        state,
        &ClientboundPacket::CustomPayload {
            channel: "minecraft:brand".into(),
            data: brand.to_vec(),
        },
    )
    .await?;
    send(
        &mut conn,
        shared,
        state,
        &ClientboundPacket::CustomReportDetails { details: Vec::new() },
    )
    .await?;
    send(
        &mut conn,
        shared,
        state,
        &ClientboundPacket::ServerLinks { links: Vec::new() },
    )
    .await?;
    send(
        &mut conn,
        shared,
        state,
        &ClientboundPacket::UpdateEnabledFeatures {
            features: vec!["minecraft:vanilla".into()],
        },
    )
    .await?;
    let core_pack = KnownPack {
        namespace: "minecraft".into(),
        id: "core".into(),
        version: shared.adapter.version_name().into(),
    };
    send(
        &mut conn,
        shared,
        state,
        &ClientboundPacket::SelectKnownPacks {
            packs: vec![core_pack.clone()],
        },
    )
    .await?;

    let mut skin = SkinSettings::default();
    loop {
        let (id, packet) = read_packet(&mut conn, shared, state).await?;
        match (state, packet) {
            (ConnectionState::Configuration, ServerboundPacket::ClientInformation {
                locale,
                view_distance,
                skin_parts,
                main_hand,
                ..
            }) => {
                debug!("client info: locale={locale}, view_distance={view_distance}");
                skin = SkinSettings {
                    layers: skin_parts & 0x7F,
                    main_hand: if main_hand == 0 { 0 } else { 1 },
                };
            }
            (ConnectionState::Configuration, ServerboundPacket::CustomPayload { channel, .. }) => {
                debug!("configuration payload on {channel}");
            }
            (ConnectionState::Configuration, ServerboundPacket::SelectKnownPacks { packs }) => {
                // Registry entries were encoded against the core pack; a
                // client without it cannot resolve the defaults.
                if !packs.contains(&core_pack) {
                    return disconnect(
                        &mut conn,
                        shared,
                        state,
                        TextComponent::translated("multiplayer.disconnect.outdated_client"),
                    )
                    .await;
                }
                for body in shared.registry.network_data()? {
                    send(
                        &mut conn,
                        shared,
                        state,
                        &ClientboundPacket::RegistryData { body: body.clone() },
                    )
                    .await?;
                }
                send(
                    &mut conn,
                    shared,
                    state,
                    &ClientboundPacket::UpdateTags {
                        body: shared.registry.network_tags()?.to_vec(),
                    },
                )
                .await?;
                send(&mut conn, shared, state, &ClientboundPacket::FinishConfiguration).await?;
                state = ConnectionState::ConfigurationWaitAck;
            }
            (ConnectionState::ConfigurationWaitAck, ServerboundPacket::FinishConfiguration) => {
                break;
            }
            (state, _) => bail!(ProtocolError::UnexpectedPacket { state, id }),
        }
    }

    // Hand the socket to its reader/writer tasks and the player to the game
    // loop; this task is done.
    let (reader, writer) = conn.into_split();
    let (packet_tx, packet_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_writer(writer, packet_rx, shared.clone()));
    tokio::spawn(run_reader(reader, inbound_tx, shared.clone()));
    shared
        .new_player_tx
        .send(NewPlayer {
            profile,
            skin,
            packet_tx,
            inbound_rx,
        })
        .map_err(|_| anyhow!("server is shutting down"))?;
    Ok(())
}

/// Encode clientbound packets in queue order. The packet stream starts in
/// Configuration (for a possible join rejection) and flips to Play with the
/// login packet.
async fn run_writer(
    mut writer: ConnectionWriter,
    mut packet_rx: mpsc::UnboundedReceiver<ClientboundPacket>,
    shared: Arc<ServerShared>,
) {
    let mut state = ConnectionState::Configuration;
    while let Some(packet) = packet_rx.recv().await {
        if matches!(packet, ClientboundPacket::Login { .. }) {
            state = ConnectionState::Play;
        }
        match shared.adapter.encode(state, &packet) {
            Ok((id, body)) => {
                if writer.write_packet(id, &body).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("failed to encode clientbound packet: {e:#}"),
        }
    }
    writer.shutdown().await;
}

/// Decode serverbound play packets into the game loop's queue. A protocol
/// error is forwarded so the game loop can tear the player down; a closed
/// socket just drops the sender.
async fn run_reader(
    mut reader: ConnectionReader,
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    shared: Arc<ServerShared>,
) {
    loop {
        match reader.read_packet().await {
            Ok((id, mut body)) => {
                match shared.adapter.decode(ConnectionState::Play, id, &mut body) {
                    Ok(packet) => {
                        if inbound_tx.send(InboundEvent::Packet(packet)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = inbound_tx.send(InboundEvent::Error(format!("{e:#}")));
                        return;
                    }
                }
            }
            Err(_) => return,
        }
    }
}

async fn read_packet(
    conn: &mut Connection,
    shared: &Arc<ServerShared>,
    state: ConnectionState,
) -> Result<(i32, ServerboundPacket)> {
    match conn.read_frame().await? {
        Frame::Packet { id, mut body } => {
            Ok((id, shared.adapter.decode(state, id, &mut body)?))
        }
        Frame::LegacyPing { .. } => bail!("legacy ping after handshake"),
    }
}

async fn send(
    conn: &mut Connection,
    shared: &Arc<ServerShared>,
    state: ConnectionState,
    packet: &ClientboundPacket,
) -> Result<()> {
    let (id, body) = shared.adapter.encode(state, packet)?;
    conn.write_packet(id, &body).await
}

async fn disconnect(
    conn: &mut Connection,
    shared: &Arc<ServerShared>,
    state: ConnectionState,
    reason: TextComponent,
) -> Result<()> {
    send(conn, shared, state, &ClientboundPacket::Disconnect { reason }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ServerHandler;
    use crate::properties::ServerProperties;
    use basalt_protocol_core::{read_i64, read_varint, try_peek_varint, write_varint};
    use basalt_registry::Registry;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct Hub;
    impl ServerHandler for Hub {}

    async fn serve_one_connection() -> std::net::SocketAddr {
        let mut registry = Registry::load_default().unwrap();
        registry.finalize().unwrap();
        let (new_player_tx, _new_player_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ServerShared::for_tests(
            ServerProperties::default(),
            Arc::new(registry),
            Arc::new(Hub),
            new_player_tx,
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            handle_connection(socket, shared).await;
        });
        addr
    }

    async fn write_frame(stream: &mut TcpStream, id: i32, body: &[u8]) {
        let mut packet = BytesMut::new();
        write_varint(&mut packet, id);
        packet.extend_from_slice(body);
        let mut frame = BytesMut::new();
        write_varint(&mut frame, packet.len() as i32);
        frame.extend_from_slice(&packet);
        stream.write_all(&frame).await.unwrap();
    }

    async fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> (i32, BytesMut) {
        loop {
            if let Some((length, header)) = try_peek_varint(buf).unwrap() {
                if buf.len() - header >= length as usize {
                    let _ = buf.split_to(header);
                    let mut body = buf.split_to(length as usize);
                    let id = read_varint(&mut body).unwrap();
                    return (id, body);
                }
            }
            let mut tmp = [0u8; 4096];
            let n = stream.read(&mut tmp).await.unwrap();
            assert!(n > 0, "server closed early");
            buf.extend_from_slice(&tmp[..n]);
        }
    }

    #[tokio::test]
    async fn test_status_ping_exchange() {
        let addr = serve_one_connection().await;
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut recv = BytesMut::new();

        let mut body = BytesMut::new();
        write_varint(&mut body, 772);
        basalt_protocol_core::write_string(&mut body, "localhost");
        bytes::BufMut::put_u16(&mut body, 25565);
        write_varint(&mut body, 1);
        write_frame(&mut client, 0x00, &body).await;
        write_frame(&mut client, 0x00, &[]).await;

        let (id, mut payload) = read_frame(&mut client, &mut recv).await;
        assert_eq!(id, 0x00);
        let json = basalt_protocol_core::read_string(&mut payload, 32767).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"]["protocol"], 772);
        assert_eq!(value["players"]["max"], 20);

        let mut ping = BytesMut::new();
        bytes::BufMut::put_i64(&mut ping, 0x0102030405060708);
        write_frame(&mut client, 0x01, &ping).await;
        let (id, mut payload) = read_frame(&mut client, &mut recv).await;
        assert_eq!(id, 0x01);
        assert_eq!(read_i64(&mut payload).unwrap(), 0x0102030405060708);
    }

    #[tokio::test]
    async fn test_legacy_ping_exchange() {
        let addr = serve_one_connection().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut frame = BytesMut::new();
        frame.extend_from_slice(&[0xFE, 0x01, 0xFA]);
        let channel: Vec<u16> = "MC|PingHost".encode_utf16().collect();
        bytes::BufMut::put_u16(&mut frame, channel.len() as u16);
        for c in &channel {
            bytes::BufMut::put_u16(&mut frame, *c);
        }
        let host: Vec<u16> = "localhost".encode_utf16().collect();
        bytes::BufMut::put_u16(&mut frame, (7 + host.len() * 2) as u16);
        bytes::BufMut::put_u8(&mut frame, 78);
        bytes::BufMut::put_u16(&mut frame, host.len() as u16);
        for c in &host {
            bytes::BufMut::put_u16(&mut frame, *c);
        }
        bytes::BufMut::put_u32(&mut frame, 25565);
        client.write_all(&frame).await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response[0], 0xFF);
        let chars = u16::from_be_bytes([response[1], response[2]]) as usize;
        assert_eq!(response.len(), 3 + chars * 2);
        // The payload opens with the §1 marker.
        assert_eq!(u16::from_be_bytes([response[3], response[4]]), 0x00A7);
    }

    #[tokio::test]
    async fn test_unexpected_packet_closes_connection() {
        let addr = serve_one_connection().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut body = BytesMut::new();
        write_varint(&mut body, 772);
        basalt_protocol_core::write_string(&mut body, "localhost");
        bytes::BufMut::put_u16(&mut body, 25565);
        write_varint(&mut body, 1);
        write_frame(&mut client, 0x00, &body).await;
        // A login packet id in the status state has no handler.
        write_frame(&mut client, 0x7E, &[]).await;

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
