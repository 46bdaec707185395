//! Handshake and session management payloads.
//!
//! ```text
//! client                          server
//!   Hello { client_nonce }  ───▶
//!                           ◀───  Challenge { session_id, server_nonce, proof }
//!   Response { proof }      ───▶
//!                           ◀───  Accept
//! ```

use authnet_crypto::{HANDSHAKE_NONCE_SIZE, PROOF_SIZE};
use serde::{Deserialize, Serialize};

/// Protocol version carried in Hello
pub const PROTOCOL_VERSION: u8 = 1;

/// Client's opening handshake message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version (currently 1)
    pub version: u8,

    /// Fresh random nonce contributed by the client
    pub client_nonce: [u8; HANDSHAKE_NONCE_SIZE],

    /// Optional self-reported client name, for logging on the server.
    /// Not authenticated beyond the handshake proof.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_id: Option<String>,
}

/// Server's reply to Hello
///
/// Assigns the session id and proves the server holds the HMAC key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Session identifier for all following frames
    pub session_id: u64,

    /// Fresh random nonce contributed by the server
    pub server_nonce: [u8; HANDSHAKE_NONCE_SIZE],

    /// Server proof over the handshake transcript
    pub proof: [u8; PROOF_SIZE],
}

/// Client's proof of the HMAC key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Client proof over the handshake transcript
    pub proof: [u8; PROOF_SIZE],
}

/// Graceful disconnect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason
    pub reason: String,
}
