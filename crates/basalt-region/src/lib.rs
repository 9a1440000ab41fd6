mod region_file;

pub use region_file::{RegionError, RegionFile, RegionStorage};
