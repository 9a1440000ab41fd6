use basalt_types::BlockPos;
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("VarInt longer than 5 bytes")]
    MalformedVarInt,
    #[error("unexpected end of buffer")]
    UnexpectedEnd,
    #[error("string too long: {0} > {1}")]
    StringTooLong(usize, usize),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Read a VarInt from the buffer.
pub fn read_varint(buf: &mut BytesMut) -> CodecResult<i32> {
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::UnexpectedEnd);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 35 {
            return Err(CodecError::MalformedVarInt);
        }
    }
}

/// Peek a VarInt without consuming. Returns `(value, encoded_len)`, or
/// `None` when the buffer holds only a prefix of a valid VarInt.
pub fn try_peek_varint(buf: &BytesMut) -> CodecResult<Option<(i32, usize)>> {
    let mut result: i32 = 0;
    for (i, &byte) in buf.iter().take(5).enumerate() {
        result |= ((byte & 0x7F) as i32) << (7 * i as u32);
        if byte & 0x80 == 0 {
            return Ok(Some((result, i + 1)));
        }
    }
    if buf.len() >= 5 {
        return Err(CodecError::MalformedVarInt);
    }
    Ok(None)
}

/// Write a VarInt to the buffer.
pub fn write_varint(buf: &mut BytesMut, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Calculate the byte length of a VarInt.
pub fn varint_len(value: i32) -> usize {
    let mut val = value as u32;
    let mut len = 0;
    loop {
        len += 1;
        val >>= 7;
        if val == 0 {
            break;
        }
    }
    len
}

pub fn read_u8(buf: &mut BytesMut) -> CodecResult<u8> {
    if !buf.has_remaining() {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(buf.get_u8())
}

pub fn peek_u8(buf: &BytesMut) -> CodecResult<u8> {
    buf.first().copied().ok_or(CodecError::UnexpectedEnd)
}

pub fn read_i8(buf: &mut BytesMut) -> CodecResult<i8> {
    Ok(read_u8(buf)? as i8)
}

pub fn read_bool(buf: &mut BytesMut) -> CodecResult<bool> {
    Ok(read_u8(buf)? != 0)
}

pub fn read_u16(buf: &mut BytesMut) -> CodecResult<u16> {
    if buf.remaining() < 2 {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(buf.get_u16())
}

pub fn read_i16(buf: &mut BytesMut) -> CodecResult<i16> {
    Ok(read_u16(buf)? as i16)
}

pub fn read_i32(buf: &mut BytesMut) -> CodecResult<i32> {
    if buf.remaining() < 4 {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(buf.get_i32())
}

pub fn read_i64(buf: &mut BytesMut) -> CodecResult<i64> {
    if buf.remaining() < 8 {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(buf.get_i64())
}

pub fn read_f32(buf: &mut BytesMut) -> CodecResult<f32> {
    Ok(f32::from_bits(read_i32(buf)? as u32))
}

pub fn read_f64(buf: &mut BytesMut) -> CodecResult<f64> {
    Ok(f64::from_bits(read_i64(buf)? as u64))
}

/// Read exactly `n` raw bytes.
pub fn read_bytes(buf: &mut BytesMut, n: usize) -> CodecResult<Vec<u8>> {
    if buf.remaining() < n {
        return Err(CodecError::UnexpectedEnd);
    }
    Ok(buf.split_to(n).to_vec())
}

/// Drain whatever remains of the current packet body.
pub fn read_remaining(buf: &mut BytesMut) -> Vec<u8> {
    buf.split_to(buf.len()).to_vec()
}

/// Read a protocol string (varint-prefixed UTF-8).
pub fn read_string(buf: &mut BytesMut, max_len: usize) -> CodecResult<String> {
    let len = read_varint(buf)? as usize;
    if len > max_len * 4 {
        return Err(CodecError::StringTooLong(len, max_len));
    }
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEnd);
    }
    let bytes = buf.split_to(len);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a protocol string.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Read a packed block position.
pub fn read_position(buf: &mut BytesMut) -> CodecResult<BlockPos> {
    Ok(BlockPos::decode(read_i64(buf)? as u64))
}

/// Write a packed block position.
pub fn write_position(buf: &mut BytesMut, pos: &BlockPos) {
    buf.put_u64(pos.encode());
}

/// Read a UUID (128 bits, big endian).
pub fn read_uuid(buf: &mut BytesMut) -> CodecResult<Uuid> {
    if buf.remaining() < 16 {
        return Err(CodecError::UnexpectedEnd);
    }
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a UUID.
pub fn write_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

/// Read a byte array with varint length prefix.
pub fn read_byte_array(buf: &mut BytesMut) -> CodecResult<Vec<u8>> {
    let len = read_varint(buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::UnexpectedEnd);
    }
    let bytes = buf.split_to(len);
    Ok(bytes.to_vec())
}

/// Write a byte array with varint length prefix.
pub fn write_byte_array(buf: &mut BytesMut, data: &[u8]) {
    write_varint(buf, data.len() as i32);
    buf.put_slice(data);
}

/// Read a Slot (1.21 component-based format).
/// Returns None for empty slots (item_count == 0).
pub fn read_slot(buf: &mut BytesMut) -> CodecResult<Option<basalt_types::ItemStack>> {
    let item_count = read_varint(buf)?;
    if item_count <= 0 {
        return Ok(None);
    }
    let item_id = read_varint(buf)?;
    let add_count = read_varint(buf)?;
    let remove_count = read_varint(buf)?;
    // Component payloads are opaque to the core; plain items carry none.
    if add_count > 0 || remove_count > 0 {
        tracing::debug!(
            "slot has {} added, {} removed components — not parsed",
            add_count,
            remove_count
        );
    }
    Ok(Some(basalt_types::ItemStack::new(item_id, item_count as i8)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let test_cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (255, vec![0xFF, 0x01]),
            (25565, vec![0xDD, 0xC7, 0x01]),
            (2097151, vec![0xFF, 0xFF, 0x7F]),
            (i32::MAX, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x07]),
            (-1, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
            (i32::MIN, vec![0x80, 0x80, 0x80, 0x80, 0x08]),
        ];

        for (value, expected_bytes) in test_cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(buf.to_vec(), expected_bytes, "write_varint({}) failed", value);
            assert_eq!(varint_len(value), expected_bytes.len());

            let mut buf = BytesMut::from(&expected_bytes[..]);
            let result = read_varint(&mut buf).unwrap();
            assert_eq!(result, value, "read_varint for {} failed", value);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_varint_too_long() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);
        assert_eq!(read_varint(&mut buf), Err(CodecError::MalformedVarInt));
    }

    #[test]
    fn test_try_peek_varint() {
        let buf = BytesMut::from(&[0xDD, 0xC7, 0x01, 0x55][..]);
        assert_eq!(try_peek_varint(&buf).unwrap(), Some((25565, 3)));
        // A prefix of a valid varint is not an error, just absent.
        let buf = BytesMut::from(&[0xDD, 0xC7][..]);
        assert_eq!(try_peek_varint(&buf).unwrap(), None);
        let buf = BytesMut::new();
        assert_eq!(try_peek_varint(&buf).unwrap(), None);
        // Five continuation bytes can never complete.
        let buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert_eq!(try_peek_varint(&buf), Err(CodecError::MalformedVarInt));
    }

    #[test]
    fn test_string_roundtrip() {
        let test_str = "Hello, Minecraft!";
        let mut buf = BytesMut::new();
        write_string(&mut buf, test_str);
        let result = read_string(&mut buf, 32767).unwrap();
        assert_eq!(result, test_str);
    }

    #[test]
    fn test_position_roundtrip() {
        for pos in [
            BlockPos::new(3, 64, 5),
            BlockPos::new(-30_000_000 / 16, -2048, 12345),
            BlockPos::new(-1, -1, -1),
        ] {
            let mut buf = BytesMut::new();
            write_position(&mut buf, &pos);
            assert_eq!(read_position(&mut buf).unwrap(), pos);
        }
    }

    #[test]
    fn test_uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        let mut buf = BytesMut::new();
        write_uuid(&mut buf, &uuid);
        let result = read_uuid(&mut buf).unwrap();
        assert_eq!(result, uuid);
    }

    #[test]
    fn test_short_reads_fail() {
        let mut buf = BytesMut::from(&[0x01, 0x02][..]);
        assert_eq!(read_i64(&mut buf), Err(CodecError::UnexpectedEnd));
        assert_eq!(read_i32(&mut buf), Err(CodecError::UnexpectedEnd));
        assert_eq!(read_bytes(&mut buf, 3), Err(CodecError::UnexpectedEnd));
        // The two bytes are still there for a reader that fits.
        assert_eq!(read_u16(&mut buf), Ok(0x0102));
    }
}
