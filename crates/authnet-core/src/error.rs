//! Error types for the authnet session layer.
//!
//! Strongly-typed errors for the handshake and the established session. The
//! driver decides what to do with them; [`crate::AuthSocket::abort`] turns
//! any of them into an Error frame for the peer.

use std::time::Duration;

use authnet_crypto::CryptoError;
use authnet_proto::ProtocolError;
use thiserror::Error;

use crate::socket::AuthState;

/// Errors that can occur during session state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Operation not allowed in the current state or role
    #[error("invalid state: cannot {operation} in {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: AuthState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Received a frame that is not valid for the current state
    #[error("unexpected frame: opcode {opcode:#06x} in state {state:?}")]
    UnexpectedFrame {
        /// Current state when frame was received
        state: AuthState,
        /// Opcode of the unexpected frame
        opcode: u16,
    },

    /// Peer speaks a different protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Peer could not prove knowledge of the shared HMAC key
    #[error("authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// Frame carries a session id other than the negotiated one
    #[error("session mismatch: expected {expected:#018x}, got {actual:#018x}")]
    SessionMismatch {
        /// Negotiated session id
        expected: u64,
        /// Session id in the frame header
        actual: u64,
    },

    /// Data frame was replayed, reordered, or dropped
    #[error("out-of-sequence message: expected {expected}, got {actual}")]
    Replay {
        /// Next sequence number the receiver accepts
        expected: u64,
        /// Sequence number carried by the message
        actual: u64,
    },

    /// Plaintext does not fit in a single frame
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Plaintext length
        size: usize,
        /// Largest accepted plaintext
        max: usize,
    },

    /// Send counter cannot advance further
    #[error("send sequence exhausted")]
    SequenceExhausted,

    /// Handshake did not complete within the timeout
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// No traffic within the idle timeout
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// How long the session was idle
        elapsed: Duration,
    },

    /// Unknown role name
    #[error("invalid role: {0:?} (expected \"server\" or \"client\")")]
    InvalidRole(String),

    /// Tag verification or decryption failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Frame or payload could not be encoded/decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl AuthError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Timeouts may clear up on a new connection. Authentication and
    /// integrity failures never do - they indicate wrong keys or a hostile
    /// peer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HandshakeTimeout { .. } | Self::IdleTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(AuthError::HandshakeTimeout { elapsed: Duration::from_secs(1) }.is_transient());
        assert!(AuthError::IdleTimeout { elapsed: Duration::from_secs(1) }.is_transient());
        assert!(!AuthError::AuthenticationFailed("bad proof").is_transient());
        assert!(!AuthError::Replay { expected: 1, actual: 0 }.is_transient());
    }

    #[test]
    fn display() {
        let err = AuthError::Replay { expected: 5, actual: 3 };
        assert_eq!(err.to_string(), "out-of-sequence message: expected 5, got 3");

        let err = AuthError::SessionMismatch { expected: 1, actual: 2 };
        assert_eq!(
            err.to_string(),
            "session mismatch: expected 0x0000000000000001, got 0x0000000000000002"
        );
    }
}
