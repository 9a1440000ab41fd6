use crate::{ClientboundPacket, ConnectionState, ServerboundPacket};
use anyhow::Result;
use bytes::BytesMut;

/// Trait for version-specific protocol adapters.
/// Each supported protocol revision implements this trait.
pub trait ProtocolAdapter: Send + Sync {
    /// The protocol version number this adapter handles.
    fn protocol_version(&self) -> i32;

    /// The client version string this adapter reports (e.g. "1.21.8").
    fn version_name(&self) -> &'static str;

    /// Decode a packet body into a [`ServerboundPacket`].
    ///
    /// A packet id with no mapping in the given state fails with
    /// [`crate::ProtocolError::UnexpectedPacket`]; the caller must close the
    /// connection without a state transition.
    fn decode(
        &self,
        state: ConnectionState,
        id: i32,
        body: &mut BytesMut,
    ) -> Result<ServerboundPacket>;

    /// Encode a [`ClientboundPacket`], returning the packet id and body.
    fn encode(&self, state: ConnectionState, packet: &ClientboundPacket) -> Result<(i32, BytesMut)>;
}
