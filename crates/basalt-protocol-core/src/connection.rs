use crate::codec::{read_varint, try_peek_varint, write_varint};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// AES-128-CFB8 stream ciphers. The protocol derives both key and IV from the
/// shared secret, and cipher state must carry across calls, so the block size
/// is a single byte.
type Cfb8Encryptor = cfb8::Encryptor<Aes128>;
type Cfb8Decryptor = cfb8::Decryptor<Aes128>;

fn encrypt_in_place(cipher: &mut Cfb8Encryptor, data: &mut [u8]) {
    for byte in data.chunks_mut(1) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(byte));
    }
}

fn decrypt_in_place(cipher: &mut Cfb8Decryptor, data: &mut [u8]) {
    for byte in data.chunks_mut(1) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(byte));
    }
}

/// One unit read off the wire.
#[derive(Debug)]
pub enum Frame {
    /// A regular framed packet: id plus exactly the body bytes.
    Packet { id: i32, body: BytesMut },
    /// A pre-2013 server list ping (first byte `0xFE`). The fields are
    /// informational; respond with [`legacy_status_response`] and close.
    LegacyPing {
        protocol: Option<u8>,
        address: Option<String>,
        port: Option<u16>,
    },
}

/// A framed Minecraft protocol connection with optional encryption.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    /// Set from the very first received byte: `0xFE` marks a legacy ping.
    /// Only that first byte may flip the connection into legacy mode.
    legacy: Option<bool>,
    encryptor: Option<Cfb8Encryptor>,
    decryptor: Option<Cfb8Decryptor>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            legacy: None,
            encryptor: None,
            decryptor: None,
        }
    }

    /// Enable AES-CFB8 encryption with the given shared secret.
    /// Key and IV are both the shared secret.
    pub fn enable_encryption(&mut self, shared_secret: &[u8; 16]) {
        let key = GenericArray::from_slice(shared_secret);
        self.encryptor = Some(Cfb8Encryptor::new(key, key));
        self.decryptor = Some(Cfb8Decryptor::new(key, key));
    }

    /// Read the next frame, waiting for more bytes as needed.
    pub async fn read_frame(&mut self) -> anyhow::Result<Frame> {
        loop {
            match self.legacy {
                Some(true) => {
                    if let Some(frame) = try_parse_legacy_ping(&mut self.read_buf) {
                        return Ok(frame);
                    }
                }
                Some(false) => {
                    if let Some((id, body)) = try_parse_packet(&mut self.read_buf)? {
                        return Ok(Frame::Packet { id, body });
                    }
                }
                None => {}
            }

            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                if self.legacy == Some(true) {
                    // Partial legacy ping followed by EOF still gets a reply.
                    return Ok(parse_legacy_ping_fields(&self.read_buf));
                }
                return Err(anyhow::anyhow!("connection closed"));
            }
            let data = &mut tmp[..n];
            if let Some(ref mut decryptor) = self.decryptor {
                decrypt_in_place(decryptor, data);
            }
            if self.legacy.is_none() {
                self.legacy = Some(data[0] == 0xFE);
            }
            self.read_buf.extend_from_slice(data);
        }
    }

    /// Write a packet with the given ID and payload.
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet_id, payload, &mut self.encryptor);
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Write raw bytes (the legacy status response is unframed).
    pub async fn write_raw(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Split the connection into read and write halves for concurrent I/O.
    /// Encryption state is transferred to each half.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ConnectionReader {
                stream: read_half,
                read_buf: self.read_buf,
                decryptor: self.decryptor,
            },
            ConnectionWriter {
                stream: write_half,
                encryptor: self.encryptor,
            },
        )
    }
}

/// Read half of a split connection.
pub struct ConnectionReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
    decryptor: Option<Cfb8Decryptor>,
}

impl ConnectionReader {
    pub async fn read_packet(&mut self) -> anyhow::Result<(i32, BytesMut)> {
        loop {
            if let Some(result) = try_parse_packet(&mut self.read_buf)? {
                return Ok(result);
            }
            let mut tmp = [0u8; 4096];
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return Err(anyhow::anyhow!("connection closed"));
            }
            let data = &mut tmp[..n];
            if let Some(ref mut decryptor) = self.decryptor {
                decrypt_in_place(decryptor, data);
            }
            self.read_buf.extend_from_slice(data);
        }
    }
}

/// Write half of a split connection.
pub struct ConnectionWriter {
    stream: OwnedWriteHalf,
    encryptor: Option<Cfb8Encryptor>,
}

impl ConnectionWriter {
    pub async fn write_packet(&mut self, packet_id: i32, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(packet_id, payload, &mut self.encryptor);
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

// === Shared helpers ===

fn try_parse_packet(read_buf: &mut BytesMut) -> anyhow::Result<Option<(i32, BytesMut)>> {
    let (length, varint_bytes) = match try_peek_varint(read_buf)? {
        Some(v) => v,
        None => return Ok(None),
    };
    if length < 0 {
        return Err(anyhow::anyhow!("negative frame length {length}"));
    }
    let length = length as usize;

    if read_buf.len() - varint_bytes < length {
        return Ok(None);
    }

    read_buf.advance(varint_bytes);
    let mut packet_data = read_buf.split_to(length);
    let packet_id = read_varint(&mut packet_data)?;
    trace!("read packet id=0x{:02X} len={}", packet_id, packet_data.len());

    Ok(Some((packet_id, packet_data)))
}

fn build_frame(packet_id: i32, payload: &[u8], encryptor: &mut Option<Cfb8Encryptor>) -> BytesMut {
    let mut packet_buf = BytesMut::new();
    write_varint(&mut packet_buf, packet_id);
    packet_buf.extend_from_slice(payload);

    let mut frame = BytesMut::new();
    write_varint(&mut frame, packet_buf.len() as i32);
    frame.extend_from_slice(&packet_buf);

    if let Some(ref mut enc) = encryptor {
        encrypt_in_place(enc, &mut frame);
    }

    frame
}

// === Legacy (1.6) server list ping ===

/// Full legacy ping prefix: `FE 01 FA`, the UTF-16BE string "MC|PingHost",
/// a payload length, then protocol, hostname and port.
const LEGACY_PLUGIN_CHANNEL_LEN: usize = 11; // "MC|PingHost"

fn try_parse_legacy_ping(buf: &mut BytesMut) -> Option<Frame> {
    // FE 01 FA, u16 channel length, channel, u16 rest length.
    let fixed = 3 + 2 + LEGACY_PLUGIN_CHANNEL_LEN * 2 + 2;
    if buf.len() < fixed {
        return None;
    }
    let rest_len =
        u16::from_be_bytes([buf[fixed - 2], buf[fixed - 1]]) as usize;
    if buf.len() < fixed + rest_len {
        return None;
    }
    let frame = parse_legacy_ping_fields(buf);
    buf.clear();
    Some(frame)
}

/// Best-effort field extraction from however much of the legacy ping arrived.
fn parse_legacy_ping_fields(buf: &BytesMut) -> Frame {
    let fixed = 3 + 2 + LEGACY_PLUGIN_CHANNEL_LEN * 2 + 2;
    let mut protocol = None;
    let mut address = None;
    let mut port = None;
    if buf.len() > fixed {
        let rest = &buf[fixed..];
        protocol = rest.first().copied();
        if rest.len() >= 3 {
            let host_chars = u16::from_be_bytes([rest[1], rest[2]]) as usize;
            if rest.len() >= 3 + host_chars * 2 {
                let units: Vec<u16> = rest[3..3 + host_chars * 2]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                address = Some(String::from_utf16_lossy(&units));
                let tail = &rest[3 + host_chars * 2..];
                if tail.len() >= 4 {
                    port = Some(u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]) as u16);
                }
            }
        }
    }
    Frame::LegacyPing {
        protocol,
        address,
        port,
    }
}

/// Build the fixed legacy status reply: `0xFF`, a UTF-16BE char count, and a
/// `§1`-separated payload of protocol, version, MOTD and player counts.
pub fn legacy_status_response(
    protocol: i32,
    version: &str,
    motd: &str,
    online: usize,
    max: usize,
) -> Vec<u8> {
    let payload = format!("\u{a7}1\0{protocol}\0{version}\0{motd}\0{online}\0{max}");
    let units: Vec<u16> = payload.encode_utf16().collect();
    let mut out = BytesMut::with_capacity(3 + units.len() * 2);
    out.put_u8(0xFF);
    out.put_u16(units.len() as u16);
    for unit in units {
        out.put_u16(unit);
    }
    out.to_vec()
}
