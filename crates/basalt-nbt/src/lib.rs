mod nbt;
mod parse;

pub use nbt::*;
pub use parse::{parse_root, parse_root_network};
