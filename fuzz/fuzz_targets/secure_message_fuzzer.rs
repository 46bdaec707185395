//! Fuzz target for SecureMessage seal/open
//!
//! # Invariants
//!
//! - open(seal(p)) == p for any plaintext, keys and sequence
//! - Any change to sequence, nonce, ciphertext or tag makes open fail
//! - Keys for one direction never open messages for the other

#![no_main]

use arbitrary::Arbitrary;
use authnet_crypto::{HmacKey, Key, MessageKeys, NONCE_RANDOM_SIZE, SecureMessage};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Mutation {
    Sequence(u64),
    Nonce { index: u8, bit: u8 },
    Ciphertext { index: u16, bit: u8 },
    Tag { index: u8, bit: u8 },
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    key: [u8; 32],
    hmac_key: [u8; 32],
    other_hmac_key: [u8; 32],
    sequence: u64,
    random: [u8; NONCE_RANDOM_SIZE],
    plaintext: Vec<u8>,
    mutation: Mutation,
}

fuzz_target!(|scenario: Scenario| {
    let keys = MessageKeys::new(&Key::from_bytes(scenario.key), &HmacKey::from_bytes(scenario.hmac_key));
    let message = SecureMessage::seal(&scenario.plaintext, &keys, scenario.sequence, scenario.random);

    assert_eq!(message.open(&keys).expect("fresh message opens"), scenario.plaintext);

    if scenario.other_hmac_key != scenario.hmac_key {
        let other =
            MessageKeys::new(&Key::from_bytes(scenario.key), &HmacKey::from_bytes(scenario.other_hmac_key));
        assert!(message.open(&other).is_err());
    }

    let mut tampered = message.clone();
    match scenario.mutation {
        Mutation::Sequence(sequence) => tampered.sequence = sequence,
        Mutation::Nonce { index, bit } => {
            let i = index as usize % tampered.nonce.len();
            tampered.nonce[i] ^= 1 << (bit % 8);
        },
        Mutation::Ciphertext { index, bit } => {
            let i = index as usize % tampered.ciphertext.len();
            tampered.ciphertext[i] ^= 1 << (bit % 8);
        },
        Mutation::Tag { index, bit } => {
            let i = index as usize % tampered.tag.len();
            tampered.tag[i] ^= 1 << (bit % 8);
        },
    }

    if tampered != message {
        assert!(tampered.open(&keys).is_err());
    }
});
