//! Network layer error types.

use std::time::Duration;

use authnet_core::AuthError;
use authnet_crypto::CryptoError;
use authnet_proto::ProtocolError;
use thiserror::Error;

/// Errors that can occur while connecting, handshaking, or exchanging data.
#[derive(Debug, Error)]
pub enum NetError {
    /// Configuration error (invalid address, unreadable key file, etc.).
    ///
    /// Fatal for startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket I/O failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// TCP connect did not complete in time.
    #[error("connect to {address} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Address we tried to reach
        address: String,
        /// Configured connect timeout
        timeout: Duration,
    },

    /// Peer did not finish the handshake in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Connection closed before or while the operation ran.
    #[error("connection closed: {0}")]
    Closed(String),

    /// Peer sent bytes that are not a valid frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Session state machine rejected a frame or operation.
    #[error("session error: {0}")]
    Auth(#[from] AuthError),

    /// Key material could not be loaded.
    #[error("key error: {0}")]
    Crypto(#[from] CryptoError),
}

impl NetError {
    /// Returns true if retrying on a new connection may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::ConnectTimeout { .. } | Self::HandshakeTimeout(_) => true,
            Self::Auth(err) => err.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(NetError::HandshakeTimeout(Duration::from_secs(1)).is_transient());
        assert!(NetError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).is_transient());
        assert!(!NetError::Auth(AuthError::AuthenticationFailed("bad proof")).is_transient());
        assert!(!NetError::Config("bad address".to_string()).is_transient());
    }
}
