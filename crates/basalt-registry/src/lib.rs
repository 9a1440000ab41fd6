mod data_file;
mod registry;

pub use registry::{DataValue, Registry, RegistryError};
