mod chunk;
mod provider;

pub use chunk::{Chunk, ChunkSection, WorldError, MIN_Y, SECTION_COUNT};
pub use provider::{ChunkProvider, RegionChunkLoader, SuperflatGenerator};
