//! Sans-IO authenticated sessions for authnet.
//!
//! [`AuthSocket`] runs the pre-shared-key handshake and protects application
//! data once both peers have proven knowledge of the shared HMAC key. It
//! performs no I/O: drivers feed it frames and clock ticks and execute the
//! [`AuthAction`]s it returns.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//!
//! use authnet_core::{AuthAction, AuthConfig, AuthSocket, CLIENT, env::Environment};
//! use authnet_crypto::{HmacKey, Key, SharedKeys};
//!
//! #[derive(Clone)]
//! struct Fixed;
//!
//! impl Environment for Fixed {
//!     type Instant = Instant;
//!
//!     fn now(&self) -> Instant {
//!         Instant::now()
//!     }
//!
//!     fn random_bytes(&self, buffer: &mut [u8]) {
//!         buffer.fill(7);
//!     }
//! }
//!
//! let keys = SharedKeys::new(Key::from_bytes([1; 32]), HmacKey::from_bytes([2; 32]));
//! let now = Instant::now();
//! let mut client = AuthSocket::new(CLIENT, keys, AuthConfig::default(), now);
//!
//! let actions = client.start(&Fixed, now).unwrap();
//! assert!(matches!(actions[0], AuthAction::Send(_)));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod env;
mod error;
mod role;
mod socket;

pub use error::AuthError;
pub use role::{CLIENT, Role, SERVER};
pub use socket::{
    AuthAction, AuthConfig, AuthSocket, AuthState, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_IDLE_TIMEOUT, MAX_MESSAGE_SIZE,
};
