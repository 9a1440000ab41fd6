use crate::chunk::{Chunk, ChunkSection, MIN_Y, SECTION_COUNT};
use anyhow::{Context, Result};
use basalt_nbt::NbtValue;
use basalt_region::RegionStorage;
use basalt_registry::Registry;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Strategy producing a [`Chunk`] for a chunk coordinate.
pub trait ChunkProvider: Send {
    /// Load the chunk, or None where the source has nothing stored.
    fn load(&mut self, chunk_x: i32, chunk_z: i32) -> Result<Option<Chunk>>;

    /// Persist a chunk. The default implementation drops it; modified-chunk
    /// persistence is up to the provider.
    fn save(&mut self, _chunk_x: i32, _chunk_z: i32, _chunk: &Chunk) -> Result<()> {
        Ok(())
    }
}

/// Generates every chunk from a fixed column of layers.
pub struct SuperflatGenerator {
    template: Chunk,
}

impl SuperflatGenerator {
    /// Build the template from ordered `(block identifier, height)` layers,
    /// bottom-up from the lowest world Y. Anything above the last layer is air.
    pub fn new(registry: &Registry, layers: &[(&str, u32)]) -> Result<Self> {
        let mut states = Vec::with_capacity(SECTION_COUNT * 16);
        for (block, height) in layers {
            let state = registry
                .block_state_id(block)
                .with_context(|| format!("unknown block {block} in superflat layers"))?;
            for _ in 0..*height {
                states.push(state);
            }
        }
        states.resize(SECTION_COUNT * 16, 0);

        let mut template = Chunk::new();
        for (section_idx, rows) in states.chunks(16).enumerate() {
            let uniform = rows.iter().all(|&s| s == rows[0]);
            if uniform {
                template.sections[section_idx] = ChunkSection::single_value(rows[0]);
            } else {
                let section = &mut template.sections[section_idx];
                for (local_y, &state) in rows.iter().enumerate() {
                    for z in 0..16 {
                        for x in 0..16 {
                            section.set(x, local_y, z, state)?;
                        }
                    }
                }
            }
        }

        Ok(Self { template })
    }

    /// The world Y one block above the highest non-air layer.
    pub fn surface_y(&self) -> i32 {
        for (section_idx, section) in self.template.sections.iter().enumerate().rev() {
            if section.bits_per_entry == 0 && section.palette[0] == 0 {
                continue;
            }
            for local_y in (0..16).rev() {
                if section.get(0, local_y, 0) != 0 {
                    return MIN_Y + (section_idx as i32) * 16 + local_y as i32 + 1;
                }
            }
        }
        MIN_Y
    }
}

impl ChunkProvider for SuperflatGenerator {
    fn load(&mut self, _chunk_x: i32, _chunk_z: i32) -> Result<Option<Chunk>> {
        Ok(Some(self.template.clone()))
    }
}

/// Loads chunks from vanilla region files, resolving stored block states
/// through the registry's state-key table.
pub struct RegionChunkLoader {
    storage: RegionStorage,
    registry: Arc<Registry>,
}

impl RegionChunkLoader {
    pub fn new(dir: PathBuf, registry: Arc<Registry>) -> Self {
        Self {
            storage: RegionStorage::new(dir),
            registry,
        }
    }

    fn section_from_nbt(&self, section: &NbtValue) -> Option<ChunkSection> {
        let block_states = section.get("block_states")?;
        let palette_nbt = block_states.get("palette")?.as_list()?;

        let mut palette = Vec::with_capacity(palette_nbt.len());
        for entry in palette_nbt {
            let name = entry.get("Name")?.as_str()?;
            let state_id = match entry.get("Properties") {
                Some(NbtValue::Compound(props)) => {
                    // Combine Name with sorted properties into a state key.
                    let sorted: BTreeMap<&str, &str> = props
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
                        .collect();
                    let props: Vec<String> =
                        sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
                    let key = format!("{}[{}]", name, props.join(","));
                    self.registry.block_state_id(&key)
                }
                _ => self.registry.block_state_id(name),
            };
            match state_id {
                Some(id) => palette.push(id),
                None => {
                    warn!("unknown block state {name} in region chunk; using air");
                    palette.push(0);
                }
            }
        }

        let data = block_states
            .get("data")
            .and_then(|v| v.as_long_array())
            .map(|longs| longs.to_vec())
            .unwrap_or_default();

        Some(ChunkSection::from_parts(palette, data))
    }
}

impl ChunkProvider for RegionChunkLoader {
    fn load(&mut self, chunk_x: i32, chunk_z: i32) -> Result<Option<Chunk>> {
        let bytes = match self.storage.read_chunk(chunk_x, chunk_z)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let (root, _) = basalt_nbt::parse_root(&bytes)
            .with_context(|| format!("bad chunk NBT at ({chunk_x}, {chunk_z})"))?;

        // Partially generated chunks are treated as absent.
        if root.get("Status").and_then(|v| v.as_str()) != Some("minecraft:full") {
            return Ok(None);
        }

        let mut chunk = Chunk::new();
        if let Some(sections) = root.get("sections").and_then(|v| v.as_list()) {
            for section_nbt in sections {
                let y = match section_nbt.get("Y").and_then(|v| v.as_int()) {
                    Some(y) => y,
                    None => continue,
                };
                let index = y - (MIN_Y >> 4);
                if index < 0 || index as usize >= SECTION_COUNT {
                    continue;
                }
                if let Some(section) = self.section_from_nbt(section_nbt) {
                    chunk.sections[index as usize] = section;
                }
            }
        }
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_nbt::nbt_compound;
    use basalt_types::BlockPos;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::load_default().unwrap())
    }

    #[test]
    fn test_superflat_layers() {
        let registry = registry();
        let mut generator = SuperflatGenerator::new(
            &registry,
            &[
                ("minecraft:bedrock", 1),
                ("minecraft:dirt", 2),
                ("minecraft:grass_block", 1),
            ],
        )
        .unwrap();
        let chunk = generator.load(0, 0).unwrap().unwrap();

        assert_eq!(chunk.block_at(BlockPos::new(0, -64, 0)), Some(79));
        assert_eq!(chunk.block_at(BlockPos::new(5, -63, 9)), Some(10));
        assert_eq!(chunk.block_at(BlockPos::new(5, -62, 9)), Some(10));
        assert_eq!(chunk.block_at(BlockPos::new(15, -61, 15)), Some(9));
        assert_eq!(chunk.block_at(BlockPos::new(0, -60, 0)), Some(0));
        // Sections above the layers stay single-valued air.
        assert_eq!(chunk.sections[1].bits_per_entry, 0);
        assert_eq!(chunk.sections[1].palette, vec![0]);
    }

    #[test]
    fn test_superflat_surface_y() {
        let registry = registry();
        let generator = SuperflatGenerator::new(
            &registry,
            &[("minecraft:bedrock", 1), ("minecraft:dirt", 3)],
        )
        .unwrap();
        assert_eq!(generator.surface_y(), -60);
    }

    #[test]
    fn test_superflat_unknown_block() {
        let registry = registry();
        assert!(SuperflatGenerator::new(&registry, &[("minecraft:mystery", 1)]).is_err());
    }

    #[test]
    fn test_region_loader_skips_partial_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();

        let nbt = nbt_compound! {
            "Status" => NbtValue::String("minecraft:features".into()),
            "sections" => NbtValue::List(vec![]),
        };
        write_chunk_nbt(dir.path(), 0, 0, &nbt);

        let mut loader = RegionChunkLoader::new(dir.path().to_path_buf(), registry);
        assert!(loader.load(0, 0).unwrap().is_none());
        assert!(loader.load(5, 5).unwrap().is_none());
    }

    #[test]
    fn test_region_loader_resolves_state_keys() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry();

        let section = nbt_compound! {
            "Y" => NbtValue::Byte(-4),
            "block_states" => nbt_compound! {
                "palette" => NbtValue::List(vec![
                    nbt_compound! { "Name" => NbtValue::String("minecraft:bedrock".into()) },
                    nbt_compound! {
                        "Name" => NbtValue::String("minecraft:grass_block".into()),
                        "Properties" => nbt_compound! {
                            "snowy" => NbtValue::String("true".into())
                        },
                    },
                ]),
                "data" => NbtValue::LongArray(build_packed(&[1, 0, 0, 1])),
            },
        };
        let nbt = nbt_compound! {
            "Status" => NbtValue::String("minecraft:full".into()),
            "sections" => NbtValue::List(vec![section]),
        };
        write_chunk_nbt(dir.path(), 0, 0, &nbt);

        let mut loader = RegionChunkLoader::new(dir.path().to_path_buf(), registry);
        let chunk = loader.load(0, 0).unwrap().unwrap();
        // Palette resolved: bedrock=79, grass_block[snowy=true]=8.
        assert_eq!(chunk.block_at(BlockPos::new(0, -64, 0)), Some(8));
        assert_eq!(chunk.block_at(BlockPos::new(1, -64, 0)), Some(79));
        assert_eq!(chunk.block_at(BlockPos::new(3, -64, 0)), Some(8));
    }

    /// Pack 4-bit palette indices for the first entries of a section.
    fn build_packed(first_entries: &[usize]) -> Vec<i64> {
        let mut data = vec![0i64; 256];
        for (i, &idx) in first_entries.iter().enumerate() {
            data[i / 16] |= ((idx as u64 & 0xF) << ((i % 16) * 4)) as i64;
        }
        data
    }

    fn write_chunk_nbt(dir: &std::path::Path, x: usize, z: usize, nbt: &NbtValue) {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut raw = bytes::BytesMut::new();
        nbt.write_root_named("", &mut raw);
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        let compressed = enc.finish().unwrap();

        let mut file = Vec::new();
        let mut locations = [0u32; 1024];
        let sectors = (5 + compressed.len()).div_ceil(4096) as u32;
        locations[x + z * 32] = (2 << 8) | sectors;
        let mut header = vec![0u8; 8192];
        for (i, loc) in locations.iter().enumerate() {
            header[i * 4..i * 4 + 4].copy_from_slice(&loc.to_be_bytes());
        }
        file.extend_from_slice(&header);
        file.extend_from_slice(&((compressed.len() + 1) as u32).to_be_bytes());
        file.push(2);
        file.extend_from_slice(&compressed);
        file.resize(8192 + (sectors as usize) * 4096, 0);
        std::fs::write(dir.join("r.0.0.mca"), file).unwrap();
    }
}
