//! authnet Cryptographic Primitives
//!
//! Cryptographic building blocks for authnet. Everything except key
//! generation is a pure function with deterministic output: callers provide
//! random bytes, which keeps the handshake state machine testable.
//!
//! # Key Lifecycle
//!
//! Both peers hold the same pre-shared pair of secrets. A handshake mixes
//! fresh nonces from both sides into HKDF, producing independent keys for
//! each direction of each session.
//!
//! ```text
//! SharedKeys (encryption key + HMAC key, pre-shared)
//!        │
//!        ├── HMAC proofs over (client nonce, server nonce, session id)
//!        │
//!        ▼
//! HKDF → SessionKeys { client_to_server, server_to_client }
//!        │
//!        ▼
//! SecureMessage: XChaCha20-Poly1305, then HMAC-SHA256 (encrypt-then-MAC)
//! ```
//!
//! # Security
//!
//! Mutual Authentication:
//! - Each side proves possession of the HMAC key over a transcript that
//!   includes the other side's fresh nonce
//! - Server and client proofs use distinct labels, so a proof cannot be
//!   reflected back to its sender
//!
//! Session Isolation:
//! - Session keys are salted with both nonces; a recorded session cannot be
//!   replayed into a new one
//! - Each direction has its own keys
//!
//! Integrity:
//! - The HMAC tag covers sequence, nonce, and ciphertext and is checked in
//!   constant time before any decryption
//! - The sequence number is also bound as AEAD associated data

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod handshake;
pub mod keys;
pub mod message;

pub use error::CryptoError;
pub use handshake::{
    HANDSHAKE_NONCE_SIZE, PROOF_SIZE, SessionKeys, Transcript, client_proof,
    derive_session_keys, server_proof, verify_client_proof, verify_server_proof,
};
pub use keys::{HmacKey, KEY_SIZE, Key, MessageKeys, SharedKeys, generate_hmac_key, generate_key};
pub use message::{NONCE_RANDOM_SIZE, NONCE_SIZE, SecureMessage, TAG_SIZE};
