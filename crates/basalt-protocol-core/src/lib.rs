pub mod adapter;
pub mod codec;
pub mod connection;
pub mod packets;
pub mod state;

pub use adapter::*;
pub use codec::*;
pub use connection::{legacy_status_response, Connection, ConnectionReader, ConnectionWriter, Frame};
pub use packets::*;
pub use state::*;
