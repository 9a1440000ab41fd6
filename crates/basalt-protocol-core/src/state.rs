use thiserror::Error;

/// The state of a Minecraft protocol connection.
///
/// Transitions are one-directional in protocol order. The two wait-ack
/// states accept exactly one acknowledgment packet each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    LoginWaitEncrypt,
    LoginWaitAck,
    Configuration,
    ConfigurationWaitAck,
    Play,
    Closed,
}

/// The intent a client declares in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeIntent {
    Status,
    Login,
    Transfer,
}

impl HandshakeIntent {
    pub fn from_wire(next: i32) -> Self {
        match next {
            1 => HandshakeIntent::Status,
            2 => HandshakeIntent::Login,
            _ => HandshakeIntent::Transfer,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// No handler is registered for this packet id in the current state.
    /// Fatal to the connection; no state transition occurs.
    #[error("unexpected packet 0x{id:02X} in {state:?} state")]
    UnexpectedPacket { state: ConnectionState, id: i32 },
    #[error("cannot encode packet in {0:?} state")]
    BadEncodeState(ConnectionState),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_intent() {
        assert_eq!(HandshakeIntent::from_wire(1), HandshakeIntent::Status);
        assert_eq!(HandshakeIntent::from_wire(2), HandshakeIntent::Login);
        assert_eq!(HandshakeIntent::from_wire(3), HandshakeIntent::Transfer);
        assert_eq!(HandshakeIntent::from_wire(0), HandshakeIntent::Transfer);
    }
}
