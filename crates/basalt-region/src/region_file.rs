use flate2::read::ZlibDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SECTOR_BYTES: u64 = 4096;
const COMPRESSION_ZLIB: u8 = 2;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("unsupported chunk compression type {0}")]
    UnsupportedCompression(u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A single .mca region file handle, read-only.
///
/// The file opens with a 4 KiB table of 1024 locations (3-byte big-endian
/// sector offset, 1-byte sector count), followed by a timestamp table this
/// reader skips, then the chunk payloads.
pub struct RegionFile {
    file: File,
    locations: [u32; 1024],
}

impl RegionFile {
    pub fn open(path: &Path) -> Result<Self, RegionError> {
        let mut file = File::open(path)?;
        let mut header = [0u8; SECTOR_BYTES as usize];
        file.read_exact(&mut header)?;
        let mut locations = [0u32; 1024];
        for (i, loc) in locations.iter_mut().enumerate() {
            *loc = u32::from_be_bytes([
                header[i * 4],
                header[i * 4 + 1],
                header[i * 4 + 2],
                header[i * 4 + 3],
            ]);
        }
        Ok(Self { file, locations })
    }

    /// Read and decompress the chunk at region-local coordinates.
    /// Returns the raw NBT bytes, or None where no chunk is stored.
    pub fn read_chunk(
        &mut self,
        local_x: usize,
        local_z: usize,
    ) -> Result<Option<Vec<u8>>, RegionError> {
        let index = local_x + local_z * 32;
        let loc = self.locations[index];
        if loc == 0 {
            return Ok(None);
        }

        let sector = (loc >> 8) as u64;
        self.file.seek(SeekFrom::Start(sector * SECTOR_BYTES))?;

        let mut header = [0u8; 5];
        self.file.read_exact(&mut header)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let compression = header[4];

        if length <= 1 {
            return Ok(None);
        }
        if compression != COMPRESSION_ZLIB {
            return Err(RegionError::UnsupportedCompression(compression));
        }

        let mut compressed = vec![0u8; length - 1];
        self.file.read_exact(&mut compressed)?;

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(Some(out))
    }
}

/// Resolves chunk coordinates to `r.<rx>.<rz>.mca` files in a directory,
/// caching open handles by region coordinates.
pub struct RegionStorage {
    dir: PathBuf,
    cache: HashMap<(i32, i32), Option<RegionFile>>,
}

impl RegionStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            cache: HashMap::new(),
        }
    }

    pub fn read_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<Option<Vec<u8>>, RegionError> {
        let (region_x, region_z, local_x, local_z) = Self::chunk_to_region(chunk_x, chunk_z);
        match self.get_or_open(region_x, region_z)? {
            Some(region) => region.read_chunk(local_x, local_z),
            None => Ok(None),
        }
    }

    fn get_or_open(
        &mut self,
        region_x: i32,
        region_z: i32,
    ) -> Result<&mut Option<RegionFile>, RegionError> {
        if !self.cache.contains_key(&(region_x, region_z)) {
            let path = self.dir.join(format!("r.{}.{}.mca", region_x, region_z));
            // A missing file just means an unpopulated region; cache that too.
            let region = if path.exists() {
                Some(RegionFile::open(&path)?)
            } else {
                None
            };
            self.cache.insert((region_x, region_z), region);
        }
        Ok(self.cache.get_mut(&(region_x, region_z)).unwrap())
    }

    fn chunk_to_region(chunk_x: i32, chunk_z: i32) -> (i32, i32, usize, usize) {
        let region_x = chunk_x >> 5;
        let region_z = chunk_z >> 5;
        let local_x = (chunk_x & 31) as usize;
        let local_z = (chunk_z & 31) as usize;
        (region_x, region_z, local_x, local_z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Build an .mca file holding the given chunks at local coordinates.
    fn write_region(path: &Path, chunks: &[(usize, usize, &[u8], u8)]) {
        let mut file = std::fs::File::create(path).unwrap();
        let mut locations = [0u32; 1024];
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        let mut next_sector = 2u32;

        for &(x, z, data, compression) in chunks {
            let compressed = if compression == COMPRESSION_ZLIB {
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                enc.write_all(data).unwrap();
                enc.finish().unwrap()
            } else {
                data.to_vec()
            };
            let mut payload = Vec::new();
            payload.extend_from_slice(&((compressed.len() + 1) as u32).to_be_bytes());
            payload.push(compression);
            payload.extend_from_slice(&compressed);
            let sectors = (payload.len() as u64).div_ceil(SECTOR_BYTES) as u32;
            payload.resize((sectors as u64 * SECTOR_BYTES) as usize, 0);

            locations[x + z * 32] = (next_sector << 8) | sectors;
            next_sector += sectors;
            payloads.push(payload);
        }

        let mut header = vec![0u8; (SECTOR_BYTES * 2) as usize];
        for (i, loc) in locations.iter().enumerate() {
            header[i * 4..i * 4 + 4].copy_from_slice(&loc.to_be_bytes());
        }
        file.write_all(&header).unwrap();
        for payload in payloads {
            file.write_all(&payload).unwrap();
        }
    }

    #[test]
    fn test_read_stored_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(&path, &[(3, 7, b"chunk nbt bytes", COMPRESSION_ZLIB)]);

        let mut storage = RegionStorage::new(dir.path().to_path_buf());
        assert_eq!(
            storage.read_chunk(3, 7).unwrap(),
            Some(b"chunk nbt bytes".to_vec())
        );
        assert_eq!(storage.read_chunk(4, 7).unwrap(), None);
    }

    #[test]
    fn test_missing_region_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = RegionStorage::new(dir.path().to_path_buf());
        assert_eq!(storage.read_chunk(100, 100).unwrap(), None);
    }

    #[test]
    fn test_negative_coordinates_map_to_region() {
        let dir = tempfile::tempdir().unwrap();
        // Chunk (-1, -1) lives in region (-1, -1) at local (31, 31).
        let path = dir.path().join("r.-1.-1.mca");
        write_region(&path, &[(31, 31, b"negative", COMPRESSION_ZLIB)]);

        let mut storage = RegionStorage::new(dir.path().to_path_buf());
        assert_eq!(storage.read_chunk(-1, -1).unwrap(), Some(b"negative".to_vec()));
    }

    #[test]
    fn test_unsupported_compression() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(&path, &[(0, 0, b"gzip payload", 1)]);

        let mut storage = RegionStorage::new(dir.path().to_path_buf());
        match storage.read_chunk(0, 0) {
            Err(RegionError::UnsupportedCompression(1)) => {}
            other => panic!("expected UnsupportedCompression, got {:?}", other),
        }
    }

    #[test]
    fn test_handle_cache_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.0.0.mca");
        write_region(
            &path,
            &[
                (0, 0, b"first", COMPRESSION_ZLIB),
                (1, 0, b"second", COMPRESSION_ZLIB),
            ],
        );

        let mut storage = RegionStorage::new(dir.path().to_path_buf());
        assert_eq!(storage.read_chunk(0, 0).unwrap(), Some(b"first".to_vec()));
        // Deleting the file does not disturb the cached handle.
        std::fs::remove_file(&path).unwrap();
        assert_eq!(storage.read_chunk(1, 0).unwrap(), Some(b"second".to_vec()));
    }
}
