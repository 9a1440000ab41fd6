use crate::handler::{DefaultDimensionHandler, DimensionHandler};
use anyhow::{Context, Result};
use basalt_protocol_core::ClientboundPacket;
use basalt_registry::Registry;
use basalt_types::{BlockPos, Vec3d};
use basalt_world::{Chunk, ChunkProvider};
use tracing::warn;
use uuid::Uuid;

use crate::game::PlayerId;

// Entity components stored in the dimension's hecs world.

/// Network entity id, unique within the dimension.
pub(crate) struct NetworkId(pub i32);

pub(crate) struct EntityUuid(pub Uuid);

pub(crate) struct EntityKind {
    pub net_id: i32,
}

pub(crate) struct Position(pub Vec3d);

pub(crate) struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
}

/// Marks an entity row as a connected player.
pub(crate) struct PlayerRef(pub PlayerId);

/// A self-contained world: chunks, entities and players, with its own
/// provider and streaming state.
pub struct Dimension {
    pub(crate) id: String,
    pub(crate) type_id: String,
    pub(crate) type_net_id: i32,
    pub(crate) player_entity_type: i32,
    biome_id: i32,

    pub(crate) world: hecs::World,
    next_entity_id: i32,
    pub(crate) players: Vec<PlayerId>,

    chunks: std::collections::HashMap<(i32, i32), Option<Chunk>>,
    provider: Box<dyn ChunkProvider>,
    empty_chunk_data: Vec<u8>,
    empty_heightmaps: Vec<(i32, Vec<i64>)>,

    pub(crate) view_distance: i32,
    pub(crate) spawn_point: Vec3d,
    pub(crate) is_flat: bool,
    pub(crate) sea_level: i32,

    pub(crate) handler: Option<Box<dyn DimensionHandler>>,
}

impl Dimension {
    /// Requires a finalized registry (dimension-type and biome network ids
    /// exist only after finalization).
    pub fn new(
        id: &str,
        type_id: &str,
        provider: Box<dyn ChunkProvider>,
        registry: &Registry,
    ) -> Result<Self> {
        let type_net_id = registry
            .id_of("minecraft:dimension_type", type_id)
            .with_context(|| format!("unknown dimension type {type_id}"))?;
        let biome_id = registry
            .id_of("minecraft:worldgen/biome", "minecraft:plains")
            .unwrap_or(0);
        let player_entity_type = registry
            .id_of("minecraft:entity_type", "minecraft:player")
            .unwrap_or(0);

        // The all-air column reused for every missing-chunk lookup.
        let empty = Chunk::new();
        let empty_chunk_data = empty.encode_sections(biome_id);
        let empty_heightmaps = empty.heightmaps();

        Ok(Self {
            id: id.to_string(),
            type_id: type_id.to_string(),
            type_net_id,
            player_entity_type,
            biome_id,
            world: hecs::World::new(),
            next_entity_id: 1,
            players: Vec::new(),
            chunks: std::collections::HashMap::new(),
            provider,
            empty_chunk_data,
            empty_heightmaps,
            view_distance: 4,
            spawn_point: Vec3d::new(0.5, 0.0, 0.5),
            is_flat: false,
            sea_level: 63,
            handler: Some(Box::new(DefaultDimensionHandler)),
        })
    }

    pub fn with_view_distance(mut self, view_distance: i32) -> Self {
        self.view_distance = view_distance;
        self
    }

    pub fn with_spawn_point(mut self, spawn: Vec3d) -> Self {
        self.spawn_point = spawn;
        self
    }

    pub fn with_flat(mut self, is_flat: bool) -> Self {
        self.is_flat = is_flat;
        self
    }

    pub fn with_sea_level(mut self, sea_level: i32) -> Self {
        self.sea_level = sea_level;
        self
    }

    pub fn with_handler(mut self, handler: Box<dyn DimensionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimension_type(&self) -> &str {
        &self.type_id
    }

    pub(crate) fn next_entity_id(&mut self) -> i32 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    /// Cache lookup, invoking the provider on a miss. The absent sentinel is
    /// cached too, so a provider is asked about each coordinate once.
    pub(crate) fn get_chunk(&mut self, cx: i32, cz: i32) -> Option<&Chunk> {
        if !self.chunks.contains_key(&(cx, cz)) {
            let loaded = match self.provider.load(cx, cz) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("chunk provider failed at ({cx}, {cz}): {e:#}");
                    None
                }
            };
            self.chunks.insert((cx, cz), loaded);
        }
        self.chunks[&(cx, cz)].as_ref()
    }

    /// Chunk packet for the coordinate, falling back to the shared empty
    /// column where the provider has nothing.
    pub(crate) fn chunk_packet(&mut self, cx: i32, cz: i32) -> ClientboundPacket {
        let biome_id = self.biome_id;
        match self.get_chunk(cx, cz) {
            Some(chunk) => ClientboundPacket::LevelChunkWithLight {
                chunk_x: cx,
                chunk_z: cz,
                heightmaps: chunk.heightmaps(),
                data: chunk.encode_sections(biome_id),
            },
            None => ClientboundPacket::LevelChunkWithLight {
                chunk_x: cx,
                chunk_z: cz,
                heightmaps: self.empty_heightmaps.clone(),
                data: self.empty_chunk_data.clone(),
            },
        }
    }

    /// Write a block state into the owning chunk, materializing an empty
    /// column if the provider had none. The caller fans out the update.
    pub(crate) fn write_block(&mut self, pos: BlockPos, state: i32) -> Result<()> {
        let key = (pos.x >> 4, pos.z >> 4);
        // Resolve through the provider first so a stored chunk is not shadowed.
        self.get_chunk(key.0, key.1);
        let entry = self
            .chunks
            .get_mut(&key)
            .expect("chunk cache entry after get_chunk");
        let chunk = entry.get_or_insert_with(Chunk::new);
        chunk.set_block(pos, state)?;
        Ok(())
    }

    pub fn spawn_point(&self) -> Vec3d {
        self.spawn_point
    }

    pub fn view_distance(&self) -> i32 {
        self.view_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_world::SuperflatGenerator;
    use std::sync::Arc;

    fn finalized_registry() -> Arc<Registry> {
        let mut registry = Registry::load_default().unwrap();
        registry.finalize().unwrap();
        Arc::new(registry)
    }

    fn flat_dimension(registry: &Registry) -> Dimension {
        let generator =
            SuperflatGenerator::new(registry, &[("minecraft:bedrock", 1), ("minecraft:stone", 3)])
                .unwrap();
        Dimension::new(
            "minecraft:overworld",
            "minecraft:overworld",
            Box::new(generator),
            registry,
        )
        .unwrap()
        .with_flat(true)
    }

    #[test]
    fn test_unknown_dimension_type_rejected() {
        let registry = finalized_registry();
        let generator = SuperflatGenerator::new(&registry, &[("minecraft:stone", 1)]).unwrap();
        assert!(Dimension::new("x:y", "x:missing", Box::new(generator), &registry).is_err());
    }

    #[test]
    fn test_chunk_cache_hits_provider_once() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingProvider(Arc<AtomicU32>);
        impl ChunkProvider for CountingProvider {
            fn load(&mut self, _cx: i32, _cz: i32) -> Result<Option<Chunk>> {
                self.0.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
        let registry = finalized_registry();
        let calls = Arc::new(AtomicU32::new(0));
        let mut dim = Dimension::new(
            "minecraft:overworld",
            "minecraft:overworld",
            Box::new(CountingProvider(calls.clone())),
            &registry,
        )
        .unwrap();
        assert!(dim.get_chunk(3, 4).is_none());
        assert!(dim.get_chunk(3, 4).is_none());
        assert!(dim.get_chunk(3, 5).is_none());
        // The absent sentinel suppressed the repeat call.
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_write_block_materializes_missing_chunk() {
        let registry = finalized_registry();
        let mut dim = flat_dimension(&registry);
        let pos = BlockPos::new(3, 64, 5);
        dim.write_block(pos, 14).unwrap();
        let chunk = dim.get_chunk(0, 0).unwrap();
        assert_eq!(chunk.block_at(pos), Some(14));
        // The generated bedrock floor is still there underneath.
        assert_eq!(chunk.block_at(BlockPos::new(3, -64, 5)), Some(79));
    }

    #[test]
    fn test_empty_chunk_packet_reused_for_missing() {
        struct NoChunks;
        impl ChunkProvider for NoChunks {
            fn load(&mut self, _cx: i32, _cz: i32) -> Result<Option<Chunk>> {
                Ok(None)
            }
        }
        let registry = finalized_registry();
        let mut dim = Dimension::new(
            "minecraft:overworld",
            "minecraft:overworld",
            Box::new(NoChunks),
            &registry,
        )
        .unwrap();
        let packet = dim.chunk_packet(7, -3);
        match packet {
            ClientboundPacket::LevelChunkWithLight {
                chunk_x,
                chunk_z,
                data,
                ..
            } => {
                assert_eq!((chunk_x, chunk_z), (7, -3));
                assert_eq!(data, Chunk::new().encode_sections(0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
