//! Handshake proofs and session key derivation.
//!
//! The handshake is a symmetric-key challenge/response: both peers
//! contribute a fresh nonce and each proves knowledge of the HMAC key by
//! tagging the shared [`Transcript`]. Once both proofs verify, both sides
//! derive the same [`SessionKeys`].

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{CryptoError, HmacKey, KEY_SIZE, MessageKeys, SharedKeys};

type HmacSha256 = Hmac<Sha256>;

/// Size of each peer's handshake nonce (32 bytes)
pub const HANDSHAKE_NONCE_SIZE: usize = 32;

/// Size of a handshake proof (HMAC-SHA256 output)
pub const PROOF_SIZE: usize = 32;

const SERVER_PROOF_LABEL: &[u8] = b"authnet server proof v1";
const CLIENT_PROOF_LABEL: &[u8] = b"authnet client proof v1";

const C2S_ENC_LABEL: &[u8] = b"authnet c2s enc";
const C2S_MAC_LABEL: &[u8] = b"authnet c2s mac";
const S2C_ENC_LABEL: &[u8] = b"authnet s2c enc";
const S2C_MAC_LABEL: &[u8] = b"authnet s2c mac";

/// Values both peers agree on during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transcript {
    /// Nonce sent by the client in Hello
    pub client_nonce: [u8; HANDSHAKE_NONCE_SIZE],
    /// Nonce sent by the server in Challenge
    pub server_nonce: [u8; HANDSHAKE_NONCE_SIZE],
    /// Session identifier assigned by the server
    pub session_id: u64,
}

impl Transcript {
    /// Byte encoding: `client_nonce || server_nonce || session_id (BE)`.
    pub fn to_bytes(&self) -> [u8; 2 * HANDSHAKE_NONCE_SIZE + 8] {
        let mut bytes = [0u8; 2 * HANDSHAKE_NONCE_SIZE + 8];
        bytes[..32].copy_from_slice(&self.client_nonce);
        bytes[32..64].copy_from_slice(&self.server_nonce);
        bytes[64..].copy_from_slice(&self.session_id.to_be_bytes());
        bytes
    }
}

/// Per-session keys, one set per direction.
#[derive(Debug, Clone)]
pub struct SessionKeys {
    /// Protects messages sent by the client
    pub client_to_server: MessageKeys,
    /// Protects messages sent by the server
    pub server_to_client: MessageKeys,
}

/// Proof the server sends in its Challenge.
pub fn server_proof(hmac_key: &HmacKey, transcript: &Transcript) -> [u8; PROOF_SIZE] {
    proof(hmac_key, SERVER_PROOF_LABEL, transcript)
}

/// Proof the client sends in its Response.
pub fn client_proof(hmac_key: &HmacKey, transcript: &Transcript) -> [u8; PROOF_SIZE] {
    proof(hmac_key, CLIENT_PROOF_LABEL, transcript)
}

/// Check a server proof in constant time.
pub fn verify_server_proof(
    hmac_key: &HmacKey,
    transcript: &Transcript,
    candidate: &[u8],
) -> Result<(), CryptoError> {
    verify(hmac_key, SERVER_PROOF_LABEL, transcript, candidate)
}

/// Check a client proof in constant time.
pub fn verify_client_proof(
    hmac_key: &HmacKey,
    transcript: &Transcript,
    candidate: &[u8],
) -> Result<(), CryptoError> {
    verify(hmac_key, CLIENT_PROOF_LABEL, transcript, candidate)
}

/// Derive both directions' keys for a session.
///
/// # Security
///
/// - Salted with both nonces and the session id, so every session gets
///   unrelated keys even though the pre-shared keys never change
/// - Encryption keys come only from the encryption key and MAC keys only from
///   the HMAC key
/// - Deterministic: both peers compute the same output
pub fn derive_session_keys(shared: &SharedKeys, transcript: &Transcript) -> SessionKeys {
    let salt = transcript.to_bytes();
    let enc = Hkdf::<Sha256>::new(Some(&salt), shared.key.as_bytes());
    let mac = Hkdf::<Sha256>::new(Some(&salt), shared.hmac_key.as_bytes());

    SessionKeys {
        client_to_server: MessageKeys::from_raw(
            expand(&enc, C2S_ENC_LABEL),
            expand(&mac, C2S_MAC_LABEL),
        ),
        server_to_client: MessageKeys::from_raw(
            expand(&enc, S2C_ENC_LABEL),
            expand(&mac, S2C_MAC_LABEL),
        ),
    }
}

fn expand(hkdf: &Hkdf<Sha256>, info: &[u8]) -> [u8; KEY_SIZE] {
    let mut okm = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}

fn proof_mac(hmac_key: &HmacKey, label: &[u8], transcript: &Transcript) -> HmacSha256 {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(hmac_key.as_bytes()) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(label);
    mac.update(&transcript.to_bytes());
    mac
}

fn proof(hmac_key: &HmacKey, label: &[u8], transcript: &Transcript) -> [u8; PROOF_SIZE] {
    let result = proof_mac(hmac_key, label, transcript).finalize().into_bytes();

    let mut out = [0u8; PROOF_SIZE];
    out.copy_from_slice(&result);
    out
}

fn verify(
    hmac_key: &HmacKey,
    label: &[u8],
    transcript: &Transcript,
    candidate: &[u8],
) -> Result<(), CryptoError> {
    proof_mac(hmac_key, label, transcript)
        .verify_slice(candidate)
        .map_err(|_| CryptoError::MacMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, NONCE_RANDOM_SIZE, SecureMessage};

    fn shared(seed: u8) -> SharedKeys {
        SharedKeys::new(Key::from_bytes([seed; 32]), HmacKey::from_bytes([seed ^ 0x5A; 32]))
    }

    fn transcript() -> Transcript {
        Transcript { client_nonce: [1; 32], server_nonce: [2; 32], session_id: 42 }
    }

    #[test]
    fn transcript_layout() {
        let bytes = transcript().to_bytes();
        assert_eq!(&bytes[..32], &[1; 32]);
        assert_eq!(&bytes[32..64], &[2; 32]);
        assert_eq!(&bytes[64..], &42u64.to_be_bytes());
    }

    #[test]
    fn proofs_verify_with_same_key() {
        let keys = shared(1);
        let t = transcript();

        let server = server_proof(&keys.hmac_key, &t);
        let client = client_proof(&keys.hmac_key, &t);

        assert!(verify_server_proof(&keys.hmac_key, &t, &server).is_ok());
        assert!(verify_client_proof(&keys.hmac_key, &t, &client).is_ok());
    }

    #[test]
    fn server_and_client_proofs_differ() {
        let keys = shared(1);
        let t = transcript();

        let server = server_proof(&keys.hmac_key, &t);
        assert_ne!(server, client_proof(&keys.hmac_key, &t));

        // A reflected server proof must not pass as a client proof
        assert_eq!(
            verify_client_proof(&keys.hmac_key, &t, &server),
            Err(CryptoError::MacMismatch)
        );
    }

    #[test]
    fn proof_fails_with_other_key() {
        let t = transcript();
        let proof = server_proof(&shared(1).hmac_key, &t);
        assert_eq!(
            verify_server_proof(&shared(2).hmac_key, &t, &proof),
            Err(CryptoError::MacMismatch)
        );
    }

    #[test]
    fn proof_binds_every_transcript_field() {
        let keys = shared(3);
        let t = transcript();
        let proof = server_proof(&keys.hmac_key, &t);

        let mut other = t;
        other.client_nonce[0] ^= 1;
        assert!(verify_server_proof(&keys.hmac_key, &other, &proof).is_err());

        let mut other = t;
        other.server_nonce[31] ^= 1;
        assert!(verify_server_proof(&keys.hmac_key, &other, &proof).is_err());

        let mut other = t;
        other.session_id += 1;
        assert!(verify_server_proof(&keys.hmac_key, &other, &proof).is_err());
    }

    #[test]
    fn truncated_proof_is_rejected() {
        let keys = shared(4);
        let t = transcript();
        let proof = client_proof(&keys.hmac_key, &t);
        assert!(verify_client_proof(&keys.hmac_key, &t, &proof[..16]).is_err());
    }

    #[test]
    fn session_keys_are_deterministic() {
        let keys = shared(5);
        let a = derive_session_keys(&keys, &transcript());
        let b = derive_session_keys(&keys, &transcript());
        assert_eq!(a.client_to_server.enc(), b.client_to_server.enc());
        assert_eq!(a.server_to_client.mac(), b.server_to_client.mac());
    }

    #[test]
    fn directions_use_distinct_keys() {
        let keys = derive_session_keys(&shared(6), &transcript());
        assert_ne!(keys.client_to_server.enc(), keys.server_to_client.enc());
        assert_ne!(keys.client_to_server.mac(), keys.server_to_client.mac());
    }

    #[test]
    fn session_keys_differ_from_shared_keys() {
        let shared_keys = shared(7);
        let keys = derive_session_keys(&shared_keys, &transcript());
        assert_ne!(keys.client_to_server.enc(), shared_keys.key.as_bytes());
        assert_ne!(keys.client_to_server.mac(), shared_keys.hmac_key.as_bytes());
    }

    #[test]
    fn new_nonces_produce_new_session_keys() {
        let shared_keys = shared(8);
        let first = derive_session_keys(&shared_keys, &transcript());

        let mut t = transcript();
        t.server_nonce = [9; 32];
        let second = derive_session_keys(&shared_keys, &t);

        assert_ne!(first.client_to_server.enc(), second.client_to_server.enc());
    }

    #[test]
    fn message_sealed_by_one_side_opens_on_the_other() {
        let shared_keys = shared(10);
        let client = derive_session_keys(&shared_keys, &transcript());
        let server = derive_session_keys(&shared_keys, &transcript());

        let sealed =
            SecureMessage::seal(b"ping", &client.client_to_server, 0, [0; NONCE_RANDOM_SIZE]);
        assert_eq!(sealed.open(&server.client_to_server).unwrap(), b"ping");
        assert!(sealed.open(&server.server_to_client).is_err());
    }
}
