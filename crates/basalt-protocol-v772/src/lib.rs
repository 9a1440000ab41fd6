mod adapter;
mod ids;

pub use adapter::V772Adapter;
pub use ids::PROTOCOL_VERSION;
