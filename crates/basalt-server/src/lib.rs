//! A library for building "virtual" Minecraft Java Edition servers
//! (protocol 772): it terminates the wire protocol, negotiates login and
//! configuration, streams world state, and dispatches serverbound events to
//! embedder callbacks. It is not a game implementation.

mod auth;
mod dimension;
mod game;
mod handler;
mod network;
mod player;
mod properties;
mod server;

pub use dimension::Dimension;
pub use game::{PlayerId, PlayerPosture};
pub use handler::{
    DimensionCtx, DimensionHandler, HandlerResult, JoinDecision, LoginDecision, PlayerHandler,
    ServerHandler, StatusCtx, StatusPlayers, StatusResponse, StatusSample, StatusVersion,
};
pub use properties::ServerProperties;
pub use server::{Server, ShutdownHandle};

pub use basalt_registry::{DataValue, Registry};
pub use basalt_types as types;
pub use basalt_world::{Chunk, ChunkProvider, RegionChunkLoader, SuperflatGenerator};
