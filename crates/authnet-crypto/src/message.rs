//! `SecureMessage`: encrypt-then-MAC message envelope.
//!
//! All functions are pure - random bytes must be provided by the caller.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{CryptoError, MessageKeys};

type HmacSha256 = Hmac<Sha256>;

/// Size of the `XChaCha20` nonce (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Size of the random part of the nonce (16 bytes)
pub const NONCE_RANDOM_SIZE: usize = 16;

/// Size of the HMAC-SHA256 tag (32 bytes)
pub const TAG_SIZE: usize = 32;

/// Poly1305 tag size (16 bytes)
const POLY1305_TAG_SIZE: usize = 16;

/// Associated data prefix binding ciphertexts to this envelope format
const AAD_LABEL: &[u8] = b"authnet-msg";

/// An encrypted and authenticated message.
///
/// Layout of the protection:
/// - `ciphertext` = XChaCha20-Poly1305(enc key, `nonce`, plaintext,
///   AAD = label || `sequence`)
/// - `tag` = HMAC-SHA256(mac key, `sequence` || `nonce` || `ciphertext`)
///
/// The receiver checks `tag` before touching the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureMessage {
    /// Sender's message counter. Strictly increasing within a session.
    pub sequence: u64,
    /// The 24-byte `XChaCha20` nonce
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext including 16-byte Poly1305 tag
    pub ciphertext: Vec<u8>,
    /// HMAC-SHA256 over sequence, nonce and ciphertext
    pub tag: [u8; TAG_SIZE],
}

impl SecureMessage {
    /// Encrypt and authenticate `plaintext`.
    ///
    /// # Security
    ///
    /// - The nonce embeds `sequence`, so nonces never repeat under one key as
    ///   long as sequences do not
    /// - The random suffix keeps nonces unique even if a caller reuses a
    ///   sequence number by mistake
    /// - Caller MUST provide cryptographically secure random bytes in
    ///   production
    pub fn seal(
        plaintext: &[u8],
        keys: &MessageKeys,
        sequence: u64,
        random_suffix: [u8; NONCE_RANDOM_SIZE],
    ) -> Self {
        let nonce = build_nonce(sequence, random_suffix);
        let cipher = XChaCha20Poly1305::new(keys.enc().into());
        let aad = associated_data(sequence);

        let Ok(ciphertext) =
            cipher.encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad: &aad })
        else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };

        let tag = compute_tag(keys, sequence, &nonce, &ciphertext);

        Self { sequence, nonce, ciphertext, tag }
    }

    /// Verify and decrypt.
    ///
    /// # Errors
    ///
    /// - `MacMismatch`: HMAC tag does not match (wrong MAC key or tamper)
    /// - `DecryptionFailed`: AEAD rejected the ciphertext (wrong encryption
    ///   key)
    pub fn open(&self, keys: &MessageKeys) -> Result<Vec<u8>, CryptoError> {
        let mut mac = new_mac(keys.mac());
        mac.update(&self.sequence.to_be_bytes());
        mac.update(&self.nonce);
        mac.update(&self.ciphertext);
        mac.verify_slice(&self.tag).map_err(|_| CryptoError::MacMismatch)?;

        let cipher = XChaCha20Poly1305::new(keys.enc().into());
        let aad = associated_data(self.sequence);

        cipher
            .decrypt(
                XNonce::from_slice(&self.nonce),
                Payload { msg: self.ciphertext.as_slice(), aad: &aad },
            )
            .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication failed".to_string() })
    }

    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(POLY1305_TAG_SIZE)
    }
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    let Ok(mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac
}

fn compute_tag(
    keys: &MessageKeys,
    sequence: u64,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> [u8; TAG_SIZE] {
    let mut mac = new_mac(keys.mac());
    mac.update(&sequence.to_be_bytes());
    mac.update(nonce);
    mac.update(ciphertext);
    let result = mac.finalize().into_bytes();

    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&result);
    tag
}

fn associated_data(sequence: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_LABEL.len() + 8);
    aad.extend_from_slice(AAD_LABEL);
    aad.extend_from_slice(&sequence.to_be_bytes());
    aad
}

/// Build a 24-byte nonce for `XChaCha20`.
///
/// Structure:
/// - bytes 0-7: sequence (big-endian)
/// - bytes 8-23: random suffix (caller-provided)
fn build_nonce(sequence: u64, random_suffix: [u8; NONCE_RANDOM_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[0..8].copy_from_slice(&sequence.to_be_bytes());
    nonce[8..24].copy_from_slice(&random_suffix);
    nonce
}
