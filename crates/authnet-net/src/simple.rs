//! One-call connection setup.

use authnet_core::Role;
use authnet_crypto::SharedKeys;

use crate::{
    client::Client,
    config::{ClientConfig, ServerConfig},
    connection::SecureConnection,
    error::NetError,
    server::Server,
};

/// Open an authenticated connection with default settings.
///
/// - `SERVER`: bind `address` and return the first peer that authenticates
/// - `CLIENT`: connect to `address`
///
/// ```no_run
/// # async fn demo() -> Result<(), authnet_net::NetError> {
/// use authnet_core::CLIENT;
/// use authnet_crypto::SharedKeys;
///
/// let keys = SharedKeys::generate()?;
/// let conn = authnet_net::simple_socket(CLIENT, "127.0.0.1:7000", keys).await?;
/// conn.send(b"hello").await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// - `NetError::Config` if a server cannot bind `address`
/// - Any connect or handshake error for clients
pub async fn simple_socket(
    role: Role,
    address: &str,
    keys: SharedKeys,
) -> Result<SecureConnection, NetError> {
    match role {
        Role::Server => {
            let config = ServerConfig { bind_address: address.to_string(), ..ServerConfig::default() };
            Server::bind(config, keys).await?.accept_authenticated().await
        },
        Role::Client => {
            let config =
                ClientConfig { server_address: address.to_string(), ..ClientConfig::default() };
            Client::new(config, keys).connect().await
        },
    }
}
