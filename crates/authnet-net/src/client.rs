//! TCP client opening authenticated connections.

use authnet_core::CLIENT;
use authnet_crypto::SharedKeys;
use tokio::net::TcpStream;

use crate::{config::ClientConfig, connection::SecureConnection, error::NetError};

/// Connects to an authnet server with the shared keys.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    keys: SharedKeys,
}

impl Client {
    /// Create a client. Nothing is dialed until [`Self::connect`].
    pub fn new(config: ClientConfig, keys: SharedKeys) -> Self {
        Self { config, keys }
    }

    /// Dial the server and run the handshake.
    ///
    /// # Errors
    ///
    /// - `NetError::ConnectTimeout` if the TCP connect is too slow
    /// - `NetError::Io` if the server is unreachable
    /// - Any handshake error from [`SecureConnection::establish`]
    pub async fn connect(&self) -> Result<SecureConnection, NetError> {
        let address = &self.config.server_address;
        let timeout = self.config.connect_timeout;

        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| NetError::ConnectTimeout { address: address.clone(), timeout })??;
        stream.set_nodelay(true)?;

        let peer_addr = stream.peer_addr()?;
        tracing::debug!(%peer_addr, "connected");

        SecureConnection::establish(stream, peer_addr, CLIENT, self.keys.clone(), self.config.auth.clone())
            .await
    }
}
