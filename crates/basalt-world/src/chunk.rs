use basalt_protocol_core::write_varint;
use basalt_types::BlockPos;
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;
use thiserror::Error;

/// Total number of sections in a chunk (y=-64 to y=320, 384 blocks / 16).
pub const SECTION_COUNT: usize = 24;
/// Minimum Y coordinate.
pub const MIN_Y: i32 = -64;

/// Networked heightmap type id for MOTION_BLOCKING.
const HEIGHTMAP_MOTION_BLOCKING: i32 = 4;

#[derive(Debug, Error, PartialEq)]
pub enum WorldError {
    #[error("subchunk palette cannot exceed 8 bits per entry")]
    PaletteOverflow,
    #[error("block y={0} is outside the world")]
    OutOfBounds(i32),
}

/// A 16x16x16 chunk section with a paletted, bit-packed block array.
///
/// `bits_per_entry` is 0 for single-valued sections, otherwise the smallest
/// width in `[4, 8]` that indexes the palette. Entries never cross a long
/// boundary; `entries_per_long = 64 / bits_per_entry`.
#[derive(Clone)]
pub struct ChunkSection {
    /// Block state palette; the data array stores indices into it.
    pub palette: Vec<i32>,
    /// Inverse of `palette`.
    palette_index: HashMap<i32, usize>,
    /// Packed palette indices, 4096 entries. Empty when single-valued.
    pub data: Vec<i64>,
    pub bits_per_entry: u8,
}

fn bits_for(palette_len: usize) -> u8 {
    if palette_len <= 1 {
        0
    } else {
        let needed = (usize::BITS - (palette_len - 1).leading_zeros()) as u8;
        needed.max(4)
    }
}

impl ChunkSection {
    /// Create a single-value section (all blocks the same state id).
    pub fn single_value(state_id: i32) -> Self {
        Self {
            palette: vec![state_id],
            palette_index: HashMap::from([(state_id, 0)]),
            data: Vec::new(),
            bits_per_entry: 0,
        }
    }

    /// Create an empty (all air) section.
    pub fn empty() -> Self {
        Self::single_value(0)
    }

    /// Rebuild a section from a decoded palette and packed data.
    pub fn from_parts(palette: Vec<i32>, mut data: Vec<i64>) -> Self {
        if palette.len() <= 1 {
            return Self::single_value(palette.first().copied().unwrap_or(0));
        }
        let bits_per_entry = bits_for(palette.len());
        let entries_per_long = 64 / bits_per_entry as usize;
        data.resize(4096_usize.div_ceil(entries_per_long), 0);
        let palette_index = palette
            .iter()
            .enumerate()
            .map(|(i, &state)| (state, i))
            .collect();
        Self {
            palette,
            palette_index,
            data,
            bits_per_entry,
        }
    }

    fn entry_index(x: usize, y: usize, z: usize) -> usize {
        (x % 16) + (z % 16) * 16 + (y % 16) * 256
    }

    fn read_entry(&self, entry: usize) -> usize {
        let bits = self.bits_per_entry as usize;
        let entries_per_long = 64 / bits;
        let mask = (1u64 << bits) - 1;
        let long = self.data[entry / entries_per_long] as u64;
        let offset = (entry % entries_per_long) * bits;
        ((long >> offset) & mask) as usize
    }

    fn write_entry(&mut self, entry: usize, value: usize) {
        let bits = self.bits_per_entry as usize;
        let entries_per_long = 64 / bits;
        let mask = (1u64 << bits) - 1;
        let offset = (entry % entries_per_long) * bits;
        let long = &mut self.data[entry / entries_per_long];
        *long = ((*long as u64 & !(mask << offset)) | (((value as u64) & mask) << offset)) as i64;
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> i32 {
        if self.bits_per_entry == 0 {
            return self.palette[0];
        }
        let idx = self.read_entry(Self::entry_index(x, y, z));
        self.palette.get(idx).copied().unwrap_or(0)
    }

    /// Set one block, growing the palette (and repacking) as needed.
    pub fn set(&mut self, x: usize, y: usize, z: usize, state: i32) -> Result<(), WorldError> {
        let palette_idx = match self.palette_index.get(&state) {
            Some(&idx) => idx,
            None => {
                let new_bits = bits_for(self.palette.len() + 1);
                if new_bits > 8 {
                    return Err(WorldError::PaletteOverflow);
                }
                if new_bits > self.bits_per_entry {
                    self.repack(new_bits);
                }
                let idx = self.palette.len();
                self.palette.push(state);
                self.palette_index.insert(state, idx);
                idx
            }
        };
        if self.bits_per_entry == 0 {
            // Single-valued and the state is already the value.
            return Ok(());
        }
        self.write_entry(Self::entry_index(x, y, z), palette_idx);
        Ok(())
    }

    /// Widen every entry to `new_bits`, reallocating the long array.
    fn repack(&mut self, new_bits: u8) {
        let old = std::mem::replace(&mut self.data, Vec::new());
        let old_bits = self.bits_per_entry;
        self.bits_per_entry = new_bits;
        let entries_per_long = 64 / new_bits as usize;
        self.data = vec![0i64; 4096_usize.div_ceil(entries_per_long)];

        if old_bits == 0 {
            // All entries index 0; freshly zeroed longs already encode that.
            return;
        }
        let reader = ChunkSection {
            palette: Vec::new(),
            palette_index: HashMap::new(),
            data: old,
            bits_per_entry: old_bits,
        };
        for entry in 0..4096 {
            let value = reader.read_entry(entry);
            self.write_entry(entry, value);
        }
    }

    /// Serialize this section for the chunk data packet. The 772 form carries
    /// no data-length prefix; the reader derives the long count from
    /// `bits_per_entry` and the fixed 4096 entries. The palette size field is
    /// one past the entry count.
    pub fn encode_to(&self, buf: &mut BytesMut, biome_id: i32) {
        buf.put_i16(4096); // block count; unused by clients

        buf.put_u8(self.bits_per_entry);
        if self.bits_per_entry == 0 {
            write_varint(buf, self.palette[0]);
        } else {
            write_varint(buf, self.palette.len() as i32 + 1);
            for &entry in &self.palette {
                write_varint(buf, entry);
            }
            for &long in &self.data {
                buf.put_i64(long);
            }
        }

        // Biomes: single-valued.
        buf.put_u8(0);
        write_varint(buf, biome_id);
    }
}

/// A full chunk column.
#[derive(Clone)]
pub struct Chunk {
    pub sections: Vec<ChunkSection>,
}

impl Chunk {
    /// An all-air column.
    pub fn new() -> Self {
        Self {
            sections: (0..SECTION_COUNT).map(|_| ChunkSection::empty()).collect(),
        }
    }

    fn section_for(&mut self, y: i32) -> Result<(&mut ChunkSection, usize), WorldError> {
        let index = (y - MIN_Y) >> 4;
        if y < MIN_Y || index as usize >= self.sections.len() {
            return Err(WorldError::OutOfBounds(y));
        }
        Ok((&mut self.sections[index as usize], (y - MIN_Y) as usize % 16))
    }

    pub fn set_block(&mut self, pos: BlockPos, state: i32) -> Result<(), WorldError> {
        let x = pos.x.rem_euclid(16) as usize;
        let z = pos.z.rem_euclid(16) as usize;
        let (section, local_y) = self.section_for(pos.y)?;
        section.set(x, local_y, z, state)
    }

    pub fn block_at(&self, pos: BlockPos) -> Option<i32> {
        let index = (pos.y - MIN_Y) >> 4;
        if pos.y < MIN_Y || index as usize >= self.sections.len() {
            return None;
        }
        let section = &self.sections[index as usize];
        Some(section.get(
            pos.x.rem_euclid(16) as usize,
            ((pos.y - MIN_Y) % 16) as usize,
            pos.z.rem_euclid(16) as usize,
        ))
    }

    /// Serialize all sections into the chunk data byte array.
    pub fn encode_sections(&self, biome_id: i32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for section in &self.sections {
            section.encode_to(&mut buf, biome_id);
        }
        buf.to_vec()
    }

    /// Networked heightmaps: MOTION_BLOCKING packed at 9 bits per column.
    pub fn heightmaps(&self) -> Vec<(i32, Vec<i64>)> {
        let mut heights = [0u16; 256];

        for x in 0..16 {
            for z in 0..16 {
                let col_idx = z * 16 + x;
                'scan: for section_idx in (0..self.sections.len()).rev() {
                    let section = &self.sections[section_idx];
                    // Air-only sections cannot set a height.
                    if section.bits_per_entry == 0 && section.palette[0] == 0 {
                        continue;
                    }
                    for local_y in (0..16).rev() {
                        if section.get(x, local_y, z) != 0 {
                            let world_y = MIN_Y + (section_idx as i32) * 16 + local_y as i32;
                            heights[col_idx] = (world_y - MIN_Y + 1) as u16;
                            break 'scan;
                        }
                    }
                }
            }
        }

        // 9 bits per entry covers the 384-block range; 7 entries per long.
        let bits_per_entry = 9;
        let entries_per_long = 64 / bits_per_entry;
        let mask = (1u64 << bits_per_entry) - 1;
        let mut packed = vec![0i64; 256_usize.div_ceil(entries_per_long)];
        for (i, &h) in heights.iter().enumerate() {
            let long_index = i / entries_per_long;
            let bit_index = (i % entries_per_long) * bits_per_entry;
            packed[long_index] |= ((h as u64 & mask) << bit_index) as i64;
        }

        vec![(HEIGHTMAP_MOTION_BLOCKING, packed)]
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_stays_narrow() {
        let mut section = ChunkSection::empty();
        section.set(3, 2, 1, 0).unwrap();
        assert_eq!(section.bits_per_entry, 0);
        assert!(section.data.is_empty());
    }

    #[test]
    fn test_palette_grows_on_second_state() {
        let mut section = ChunkSection::empty();
        section.set(0, 0, 0, 9).unwrap();
        assert_eq!(section.bits_per_entry, 4);
        assert_eq!(section.palette, vec![0, 9]);
        assert_eq!(section.data.len(), 256); // 16 entries per long
        assert_eq!(section.get(0, 0, 0), 9);
        assert_eq!(section.get(1, 0, 0), 0);
    }

    #[test]
    fn test_palette_expands_past_16_states() {
        let mut section = ChunkSection::empty();
        for state in 1..=16 {
            section.set(state as usize, 0, 0, state).unwrap();
        }
        // 17 palette entries (incl. air) need 5 bits.
        assert_eq!(section.palette.len(), 17);
        assert_eq!(section.bits_per_entry, 5);
        assert_eq!(section.data.len(), 4096_usize.div_ceil(12));
        // Every earlier write survives the repack.
        for state in 1..=16 {
            assert_eq!(section.get(state as usize, 0, 0), state);
        }
    }

    #[test]
    fn test_palette_overflow_at_8_bits() {
        let mut section = ChunkSection::empty();
        // 256 states fit (8 bits); the 257th cannot.
        for state in 1..=255 {
            section
                .set((state % 16) as usize, (state / 16) as usize, 0, state)
                .unwrap();
        }
        assert_eq!(section.bits_per_entry, 8);
        let err = section.set(0, 15, 15, 9999).unwrap_err();
        assert_eq!(err, WorldError::PaletteOverflow);
        // The failed insert left the palette untouched.
        assert_eq!(section.palette.len(), 256);
    }

    #[test]
    fn test_every_data_state_in_palette() {
        let mut section = ChunkSection::empty();
        let states = [1, 9, 10, 79, 112, 118];
        for (i, &state) in states.iter().enumerate() {
            for x in 0..16 {
                section.set(x, i, x, state).unwrap();
            }
        }
        for x in 0..16 {
            for y in 0..16 {
                for z in 0..16 {
                    let state = section.get(x, y, z);
                    assert!(section.palette.contains(&state));
                }
            }
        }
        assert_eq!(section.bits_per_entry, bits_for(section.palette.len()));
    }

    #[test]
    fn test_chunk_set_block_section_selection() {
        let mut chunk = Chunk::new();
        chunk.set_block(BlockPos::new(3, -64, 5), 79).unwrap();
        chunk.set_block(BlockPos::new(3, 0, 5), 1).unwrap();
        chunk.set_block(BlockPos::new(-1, 64, -1), 9).unwrap();
        assert_eq!(chunk.block_at(BlockPos::new(3, -64, 5)), Some(79));
        assert_eq!(chunk.block_at(BlockPos::new(3, 0, 5)), Some(1));
        // Negative world coordinates index from the top of the section.
        assert_eq!(chunk.block_at(BlockPos::new(-1, 64, -1)), Some(9));
        assert_eq!(
            chunk.set_block(BlockPos::new(0, 320, 0), 1),
            Err(WorldError::OutOfBounds(320))
        );
        assert_eq!(
            chunk.set_block(BlockPos::new(0, -65, 0), 1),
            Err(WorldError::OutOfBounds(-65))
        );
    }

    #[test]
    fn test_empty_chunk_wire_form() {
        let chunk = Chunk::new();
        let data = chunk.encode_sections(0);
        // Per empty section: i16 count + u8 bits + varint state + u8 biome
        // bits + varint biome = 6 bytes.
        assert_eq!(data.len(), SECTION_COUNT * 6);
        let expected: Vec<u8> = (0..SECTION_COUNT)
            .flat_map(|_| [0x10, 0x00, 0, 0, 0, 0])
            .collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn test_mixed_section_wire_form() {
        let mut chunk = Chunk::new();
        chunk.set_block(BlockPos::new(0, -64, 0), 79).unwrap();
        let data = chunk.encode_sections(0);
        let mut buf = BytesMut::from(&data[..]);
        // First section: block count, bits, palette, longs.
        assert_eq!(buf.split_to(2)[..], [0x10, 0x00]);
        assert_eq!(buf.split_to(1)[0], 4);
        // The palette size field is entry count + 1: two entries encode as 3.
        let len = basalt_protocol_core::read_varint(&mut buf).unwrap();
        assert_eq!(len, 3);
        assert_eq!(basalt_protocol_core::read_varint(&mut buf).unwrap(), 0);
        assert_eq!(basalt_protocol_core::read_varint(&mut buf).unwrap(), 79);
        // 256 longs follow with no length prefix; the first holds entry 0.
        let first_long = u64::from_be_bytes(buf.split_to(8)[..].try_into().unwrap());
        assert_eq!(first_long & 0xF, 1);
    }

    #[test]
    fn test_from_parts_roundtrip() {
        let mut original = ChunkSection::empty();
        original.set(1, 2, 3, 10).unwrap();
        original.set(4, 5, 6, 79).unwrap();
        let rebuilt = ChunkSection::from_parts(original.palette.clone(), original.data.clone());
        assert_eq!(rebuilt.bits_per_entry, original.bits_per_entry);
        for x in 0..16 {
            for y in 0..16 {
                for z in 0..16 {
                    assert_eq!(rebuilt.get(x, y, z), original.get(x, y, z));
                }
            }
        }
    }

    #[test]
    fn test_heightmap_packing() {
        let mut chunk = Chunk::new();
        chunk.sections[0] = ChunkSection::single_value(79);
        let maps = chunk.heightmaps();
        assert_eq!(maps.len(), 1);
        let (kind, packed) = &maps[0];
        assert_eq!(*kind, HEIGHTMAP_MOTION_BLOCKING);
        assert_eq!(packed.len(), 37); // ceil(256 / 7)
        // Highest block of every column is at y = -49, height 16.
        assert_eq!(packed[0] as u64 & 0x1FF, 16);
    }
}
