//! authnet - a simple way to authorize and share network connections.
//!
//! Both ends hold the same pair of pre-shared keys. A connection is usable
//! only after each side has proven knowledge of the HMAC key, and every
//! message afterwards is encrypted, authenticated and sequence-checked.
//!
//! # Crates
//!
//! - [`authnet_crypto`]: keys, [`SecureMessage`], handshake proofs
//! - [`authnet_proto`]: frame header and payload encoding
//! - [`authnet_core`]: the sans-IO [`AuthSocket`] state machine
//! - [`authnet_net`]: tokio [`Server`], [`Client`] and [`simple_socket`]
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), authnet::NetError> {
//! use authnet::{CLIENT, SharedKeys, generate_hmac_key, generate_key, simple_socket};
//!
//! let keys = SharedKeys::new(generate_key()?, generate_hmac_key()?);
//! let mut conn = simple_socket(CLIENT, "127.0.0.1:7000", keys).await?;
//!
//! conn.send(b"hello").await?;
//! let reply = conn.recv().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub use authnet_core::{AuthConfig, AuthError, AuthSocket, AuthState, CLIENT, Role, SERVER};
pub use authnet_crypto::{
    CryptoError, HmacKey, Key, SecureMessage, SharedKeys, generate_hmac_key, generate_key,
};
pub use authnet_net::{
    Client, ClientConfig, NetError, SecureConnection, Server, ServerConfig, simple_socket,
};
pub use {authnet_core, authnet_crypto, authnet_net, authnet_proto};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
