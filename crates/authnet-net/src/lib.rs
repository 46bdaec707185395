//! Tokio runtime for authnet.
//!
//! Wraps [`authnet_core`]'s action-based [`authnet_core::AuthSocket`] with
//! real TCP I/O, system time and OS randomness.
//!
//! # Components
//!
//! - [`Server`]: TCP listener that authenticates every peer
//! - [`Client`]: dials a server and authenticates
//! - [`SecureConnection`]: handle to an established session
//! - [`simple_socket`]: one call for either role
//! - [`transport`]: frame I/O over any async byte stream
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
pub mod config;
mod connection;
mod error;
mod server;
mod simple;
mod system_env;
pub mod transport;

pub use client::Client;
pub use config::{ClientConfig, KeySource, ServerConfig, write_key_file};
pub use connection::SecureConnection;
pub use error::NetError;
pub use server::Server;
pub use simple::simple_socket;
pub use system_env::SystemEnv;
