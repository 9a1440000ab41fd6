mod angle;
mod types;

pub use angle::*;
pub use types::*;
