//! Error types for key handling and message protection.

use thiserror::Error;

/// Errors from key parsing, key generation, and message authentication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material has the wrong length
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Key material is not valid hex
    #[error("invalid key encoding: {0}")]
    InvalidEncoding(String),

    /// Key file does not contain both keys
    #[error("malformed key file: {0}")]
    MalformedKeyFile(String),

    /// The OS random number generator failed
    #[error("randomness unavailable: {0}")]
    Randomness(String),

    /// HMAC tag or handshake proof did not verify
    #[error("message authentication failed")]
    MacMismatch,

    /// AEAD decryption failed (wrong key or tampered ciphertext)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// What went wrong
        reason: String,
    },
}
