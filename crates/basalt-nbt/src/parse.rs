use crate::nbt::*;

/// Cursor over raw NBT bytes, tracking the absolute offset for error reports.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], NbtError> {
        if self.pos + n > self.data.len() {
            return Err(NbtError::UnexpectedEnd(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, NbtError> {
        Ok(self.take(1)?[0])
    }

    fn i16(&mut self) -> Result<i16, NbtError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, NbtError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64, NbtError> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes(b.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, NbtError> {
        let len = self.i16()? as u16 as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn payload(&mut self, tag: u8) -> Result<NbtValue, NbtError> {
        Ok(match tag {
            TAG_BYTE => NbtValue::Byte(self.u8()? as i8),
            TAG_SHORT => NbtValue::Short(self.i16()?),
            TAG_INT => NbtValue::Int(self.i32()?),
            TAG_LONG => NbtValue::Long(self.i64()?),
            TAG_FLOAT => NbtValue::Float(f32::from_bits(self.i32()? as u32)),
            TAG_DOUBLE => NbtValue::Double(f64::from_bits(self.i64()? as u64)),
            TAG_BYTE_ARRAY => {
                let len = self.i32()?.max(0) as usize;
                let bytes = self.take(len)?;
                NbtValue::ByteArray(bytes.iter().map(|&b| b as i8).collect())
            }
            TAG_STRING => NbtValue::String(self.string()?),
            TAG_LIST => {
                let child_tag = self.u8()?;
                let count = self.i32()?.max(0) as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.payload(child_tag)?);
                }
                NbtValue::List(items)
            }
            TAG_COMPOUND => {
                let mut entries = Vec::new();
                loop {
                    let child = self.u8()?;
                    if child == TAG_END {
                        break;
                    }
                    let name = self.string()?;
                    entries.push((name, self.payload(child)?));
                }
                NbtValue::Compound(entries)
            }
            TAG_INT_ARRAY => {
                let len = self.i32()?.max(0) as usize;
                let mut out = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    out.push(self.i32()?);
                }
                NbtValue::IntArray(out)
            }
            TAG_LONG_ARRAY => {
                let len = self.i32()?.max(0) as usize;
                let mut out = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    out.push(self.i64()?);
                }
                NbtValue::LongArray(out)
            }
            other => {
                return Err(NbtError::UnknownTag {
                    tag: other,
                    offset: self.pos - 1,
                })
            }
        })
    }
}

/// Parse a named root compound (the file form). Returns the tree and the
/// offset of the first unread byte.
pub fn parse_root(data: &[u8]) -> Result<(NbtValue, usize), NbtError> {
    let mut r = Reader { data, pos: 0 };
    let tag = r.u8()?;
    if tag != TAG_COMPOUND {
        return Err(NbtError::NonCompoundRoot(tag));
    }
    let _name = r.string()?;
    let value = r.payload(TAG_COMPOUND)?;
    Ok((value, r.pos))
}

/// Parse a nameless root compound (the network form used since 1.20.2).
pub fn parse_root_network(data: &[u8]) -> Result<(NbtValue, usize), NbtError> {
    let mut r = Reader { data, pos: 0 };
    let tag = r.u8()?;
    if tag != TAG_COMPOUND {
        return Err(NbtError::NonCompoundRoot(tag));
    }
    let value = r.payload(TAG_COMPOUND)?;
    Ok((value, r.pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nbt_compound;
    use bytes::BytesMut;

    fn roundtrip_named(value: &NbtValue) -> NbtValue {
        let mut buf = BytesMut::new();
        value.write_root_named("root", &mut buf);
        let (parsed, consumed) = parse_root(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        parsed
    }

    #[test]
    fn test_roundtrip_scalars() {
        let value = nbt_compound! {
            "b" => NbtValue::Byte(-5),
            "s" => NbtValue::Short(300),
            "i" => NbtValue::Int(-70000),
            "l" => NbtValue::Long(1 << 40),
            "f" => NbtValue::Float(1.5),
            "d" => NbtValue::Double(-2.25),
            "str" => NbtValue::String("hello".into()),
        };
        assert_eq!(roundtrip_named(&value), value);
    }

    #[test]
    fn test_roundtrip_nested() {
        let value = nbt_compound! {
            "list" => NbtValue::List(vec![NbtValue::Int(1), NbtValue::Int(2)]),
            "arrays" => nbt_compound! {
                "bytes" => NbtValue::ByteArray(vec![1, -2, 3]),
                "ints" => NbtValue::IntArray(vec![10, 20]),
                "longs" => NbtValue::LongArray(vec![-1, 0, 1]),
            },
            "empty_list" => NbtValue::List(vec![]),
        };
        assert_eq!(roundtrip_named(&value), value);
    }

    #[test]
    fn test_roundtrip_network_root() {
        let value = nbt_compound! { "k" => NbtValue::String("v".into()) };
        let mut buf = BytesMut::new();
        value.write_root_network(&mut buf);
        let (parsed, consumed) = parse_root_network(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_unknown_tag() {
        // Root compound holding a child with a bogus tag id.
        let data = [TAG_COMPOUND, 0, 0, 99];
        let err = parse_root(&data).unwrap_err();
        assert_eq!(err, NbtError::UnknownTag { tag: 99, offset: 3 });
    }

    #[test]
    fn test_truncated() {
        let value = nbt_compound! { "k" => NbtValue::Long(7) };
        let mut buf = BytesMut::new();
        value.write_root_named("", &mut buf);
        let cut = &buf[..buf.len() - 4];
        assert!(matches!(parse_root(cut), Err(NbtError::UnexpectedEnd(_))));
    }

    #[test]
    fn test_trailing_bytes_reported() {
        let value = nbt_compound! { "k" => NbtValue::Byte(1) };
        let mut buf = BytesMut::new();
        value.write_root_named("", &mut buf);
        let inner_len = buf.len();
        buf.extend_from_slice(&[0xAA, 0xBB]);
        let (_, consumed) = parse_root(&buf).unwrap();
        assert_eq!(consumed, inner_len);
    }
}
