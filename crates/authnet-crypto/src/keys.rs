//! Pre-shared key material.
//!
//! Two independent 32-byte secrets protect a session: the encryption key
//! feeds XChaCha20-Poly1305, the HMAC key authenticates the handshake and
//! every message tag. Keeping them separate means a leaked MAC key alone
//! cannot decrypt traffic.

use std::fmt;

use zeroize::Zeroize;

use crate::CryptoError;

/// Size of every key in bytes.
pub const KEY_SIZE: usize = 32;

/// Symmetric encryption key (32 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct Key([u8; KEY_SIZE]);

/// HMAC-SHA256 key (32 bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct HmacKey([u8; KEY_SIZE]);

impl Key {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy key bytes from a slice of exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        key_array(bytes).map(Self)
    }

    /// Parse a hex-encoded key. Surrounding whitespace is ignored.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        decode_hex(encoded).map(Self)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl HmacKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy key bytes from a slice of exactly [`KEY_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        key_array(bytes).map(Self)
    }

    /// Parse a hex-encoded key. Surrounding whitespace is ignored.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        decode_hex(encoded).map(Self)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for HmacKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// Key material must never reach logs
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(<redacted>)")
    }
}

impl fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HmacKey(<redacted>)")
    }
}

/// Generate a fresh encryption key from the OS random number generator.
pub fn generate_key() -> Result<Key, CryptoError> {
    random_key().map(Key)
}

/// Generate a fresh HMAC key from the OS random number generator.
pub fn generate_hmac_key() -> Result<HmacKey, CryptoError> {
    random_key().map(HmacKey)
}

fn random_key() -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut bytes = [0u8; KEY_SIZE];
    getrandom::fill(&mut bytes).map_err(|e| CryptoError::Randomness(e.to_string()))?;
    Ok(bytes)
}

fn key_array(bytes: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
    <[u8; KEY_SIZE]>::try_from(bytes)
        .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: bytes.len() })
}

fn decode_hex(encoded: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut bytes =
        hex::decode(encoded.trim()).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
    let key = key_array(&bytes);
    bytes.zeroize();
    key
}

/// The pre-shared secrets both peers must hold.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKeys {
    /// Encryption key
    pub key: Key,
    /// HMAC key
    pub hmac_key: HmacKey,
}

impl SharedKeys {
    /// Pair an encryption key with an HMAC key.
    pub fn new(key: Key, hmac_key: HmacKey) -> Self {
        Self { key, hmac_key }
    }

    /// Generate both keys from the OS random number generator.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self { key: generate_key()?, hmac_key: generate_hmac_key()? })
    }

    /// Parse both keys from hex.
    pub fn from_hex(key: &str, hmac_key: &str) -> Result<Self, CryptoError> {
        Ok(Self { key: Key::from_hex(key)?, hmac_key: HmacKey::from_hex(hmac_key)? })
    }

    /// Parse a key file.
    ///
    /// The first non-empty line that is not a `#` comment holds the
    /// encryption key in hex, the second holds the HMAC key.
    pub fn parse_key_file(contents: &str) -> Result<Self, CryptoError> {
        let mut lines =
            contents.lines().map(str::trim).filter(|line| !line.is_empty() && !line.starts_with('#'));

        let key = lines
            .next()
            .ok_or_else(|| CryptoError::MalformedKeyFile("missing encryption key".to_string()))?;
        let hmac_key =
            lines.next().ok_or_else(|| CryptoError::MalformedKeyFile("missing HMAC key".to_string()))?;

        if lines.next().is_some() {
            return Err(CryptoError::MalformedKeyFile("unexpected trailing content".to_string()));
        }

        Self::from_hex(key, hmac_key)
    }

    /// Render in the format accepted by [`Self::parse_key_file`].
    pub fn to_key_file(&self) -> String {
        format!(
            "# authnet shared keys\n# encryption key\n{}\n# hmac key\n{}\n",
            self.key.to_hex(),
            self.hmac_key.to_hex()
        )
    }
}

impl fmt::Debug for SharedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKeys").finish_non_exhaustive()
    }
}

/// Keys protecting one direction of traffic.
///
/// Inside a session these come from [`crate::derive_session_keys`]. They can
/// also be built directly from pre-shared keys to use [`crate::SecureMessage`]
/// without a handshake.
#[derive(Clone)]
pub struct MessageKeys {
    enc: [u8; KEY_SIZE],
    mac: [u8; KEY_SIZE],
}

impl MessageKeys {
    /// Use pre-shared keys directly.
    pub fn new(key: &Key, hmac_key: &HmacKey) -> Self {
        Self { enc: *key.as_bytes(), mac: *hmac_key.as_bytes() }
    }

    pub(crate) fn from_raw(enc: [u8; KEY_SIZE], mac: [u8; KEY_SIZE]) -> Self {
        Self { enc, mac }
    }

    /// AEAD key.
    pub fn enc(&self) -> &[u8; KEY_SIZE] {
        &self.enc
    }

    /// HMAC key.
    pub fn mac(&self) -> &[u8; KEY_SIZE] {
        &self.mac
    }
}

impl Drop for MessageKeys {
    fn drop(&mut self) {
        self.enc.zeroize();
        self.mac.zeroize();
    }
}

impl fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageKeys(<redacted>)")
    }
}
