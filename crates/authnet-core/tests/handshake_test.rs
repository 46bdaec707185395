//! End-to-end session tests driving a client and a server socket against
//! each other with a seeded RNG.

#![allow(clippy::disallowed_methods, reason = "Tests run on wall-clock time")]

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use authnet_core::{
    AuthAction, AuthConfig, AuthError, AuthSocket, AuthState, CLIENT, SERVER, env::Environment,
};
use authnet_crypto::{HmacKey, Key, SharedKeys};
use authnet_proto::{Frame, Opcode};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Clone)]
struct SeededEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SeededEnv {
    fn new(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Environment for SeededEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

fn shared_keys(seed: u8) -> SharedKeys {
    SharedKeys::new(Key::from_bytes([seed; 32]), HmacKey::from_bytes([seed.wrapping_add(1); 32]))
}

/// Frames queued for the other side.
fn outbound(actions: Vec<AuthAction>) -> Vec<Frame> {
    actions
        .into_iter()
        .filter_map(|action| match action {
            AuthAction::Send(frame) => Some(frame),
            _ => None,
        })
        .collect()
}

/// Shuttle frames until both sides go quiet. Returns the first error.
fn pump(
    client: &mut AuthSocket,
    server: &mut AuthSocket,
    env: &SeededEnv,
    now: Instant,
    mut to_server: Vec<Frame>,
) -> Result<(), AuthError> {
    let mut to_client = Vec::new();

    while !to_server.is_empty() || !to_client.is_empty() {
        for frame in std::mem::take(&mut to_server) {
            to_client.extend(outbound(server.handle_frame(&frame, env, now)?));
        }
        for frame in std::mem::take(&mut to_client) {
            to_server.extend(outbound(client.handle_frame(&frame, env, now)?));
        }
    }

    Ok(())
}

fn connect(
    client_keys: SharedKeys,
    server_keys: SharedKeys,
    env: &SeededEnv,
    now: Instant,
) -> (AuthSocket, AuthSocket, Result<(), AuthError>) {
    let mut client = AuthSocket::new(CLIENT, client_keys, AuthConfig::default(), now);
    let mut server = AuthSocket::new(SERVER, server_keys, AuthConfig::default(), now);

    let hello = outbound(client.start(env, now).unwrap());
    let result = pump(&mut client, &mut server, env, now, hello);

    (client, server, result)
}

#[test]
fn matching_keys_establish_session() {
    let env = SeededEnv::new(1);
    let now = Instant::now();
    let (client, server, result) = connect(shared_keys(5), shared_keys(5), &env, now);

    result.unwrap();
    assert!(client.is_established());
    assert!(server.is_established());
    assert_eq!(client.session_id(), server.session_id());
}

#[test]
fn wrong_hmac_key_fails_authentication() {
    let env = SeededEnv::new(2);
    let now = Instant::now();
    let server_keys = SharedKeys::new(Key::from_bytes([5; 32]), HmacKey::from_bytes([0xEE; 32]));
    let (client, server, result) = connect(shared_keys(5), server_keys, &env, now);

    assert!(matches!(result, Err(AuthError::AuthenticationFailed(_))));
    assert!(!client.is_established());
    assert!(!server.is_established());
}

#[test]
fn wrong_encryption_key_fails_on_first_message() {
    let env = SeededEnv::new(3);
    let now = Instant::now();
    let client_keys = SharedKeys::new(Key::from_bytes([1; 32]), HmacKey::from_bytes([9; 32]));
    let server_keys = SharedKeys::new(Key::from_bytes([2; 32]), HmacKey::from_bytes([9; 32]));
    let (mut client, mut server, result) = connect(client_keys, server_keys, &env, now);

    // Handshake only proves the HMAC key
    result.unwrap();

    let frame = client.seal(b"secret", &env).unwrap();
    let result = server.handle_frame(&frame, &env, now);
    assert!(matches!(result, Err(AuthError::Crypto(_))));
}

#[test]
fn sessions_use_distinct_ids_and_keys() {
    let env = SeededEnv::new(4);
    let now = Instant::now();
    let (mut client_a, _server_a, first) = connect(shared_keys(7), shared_keys(7), &env, now);
    let (_client_b, mut server_b, second) = connect(shared_keys(7), shared_keys(7), &env, now);
    first.unwrap();
    second.unwrap();

    assert_ne!(client_a.session_id(), server_b.session_id());

    // Data from session A is useless in session B even with the header patched
    let mut frame = client_a.seal(b"cross-session", &env).unwrap();
    frame.header.set_session_id(server_b.session_id().unwrap());
    let result = server_b.handle_frame(&frame, &env, now);
    assert!(matches!(result, Err(AuthError::Crypto(_))));
}

#[test]
fn abort_reports_error_to_peer() {
    let env = SeededEnv::new(5);
    let now = Instant::now();
    let (mut client, mut server, result) = connect(shared_keys(3), shared_keys(3), &env, now);
    result.unwrap();

    let frame = client.seal(b"once", &env).unwrap();
    server.handle_frame(&frame, &env, now).unwrap();
    let error = server.handle_frame(&frame, &env, now).unwrap_err();

    let frames = outbound(server.abort(&error));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].header.opcode_enum(), Some(Opcode::Error));

    let actions = client.handle_frame(&frames[0], &env, now).unwrap();
    assert_eq!(client.state(), AuthState::Closed);
    assert!(matches!(&actions[..], [AuthAction::Close { reason }] if reason.contains("0x0004")));
}

#[test]
fn heartbeats_keep_both_sides_alive() {
    let env = SeededEnv::new(6);
    let t0 = Instant::now();
    let (mut client, mut server, result) = connect(shared_keys(8), shared_keys(8), &env, t0);
    result.unwrap();

    // Ten minutes of silence broken only by heartbeats
    for step in 1..=60 {
        let now = t0 + Duration::from_secs(step * 10);
        let pings = outbound(client.tick(now));
        pump(&mut client, &mut server, &env, now, pings).unwrap();
        let server_frames = outbound(server.tick(now));
        assert!(server_frames.iter().all(|f| f.header.opcode_enum() == Some(Opcode::Ping)));
    }

    assert!(client.is_established());
    assert!(server.is_established());
}

#[test]
fn every_single_bit_flip_in_data_is_rejected() {
    let env = SeededEnv::new(7);
    let now = Instant::now();
    let (mut client, mut server, result) = connect(shared_keys(2), shared_keys(2), &env, now);
    result.unwrap();

    let frame = client.seal(&[0x5A; 64], &env).unwrap();

    for index in 0..frame.payload.len() {
        for bit in 0..8 {
            let mut payload = frame.payload.to_vec();
            payload[index] ^= 1 << bit;
            let tampered = Frame::new(frame.header, payload);

            assert!(
                server.handle_frame(&tampered, &env, now).is_err(),
                "flip of bit {bit} in byte {index} was accepted"
            );
        }
    }

    // Rejected copies leave the receive sequence untouched
    let actions = server.handle_frame(&frame, &env, now).unwrap();
    assert_eq!(actions, vec![AuthAction::Deliver(vec![0x5A; 64])]);
}

proptest! {
    #[test]
    fn messages_arrive_in_order(
        seed in any::<u64>(),
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..16),
    ) {
        let env = SeededEnv::new(seed);
        let now = Instant::now();
        let (mut client, mut server, result) = connect(shared_keys(1), shared_keys(1), &env, now);
        prop_assert!(result.is_ok());

        for (i, message) in messages.iter().enumerate() {
            let (sender, receiver) =
                if i % 2 == 0 { (&mut client, &mut server) } else { (&mut server, &mut client) };

            let frame = sender.seal(message, &env).unwrap();
            let actions = receiver.handle_frame(&frame, &env, now).unwrap();
            prop_assert_eq!(actions, vec![AuthAction::Deliver(message.clone())]);
        }

        prop_assert_eq!(client.messages_sent() + server.messages_sent(), messages.len() as u64);
    }

    #[test]
    fn tampered_data_is_never_delivered(
        seed in any::<u64>(),
        message in prop::collection::vec(any::<u8>(), 1..128),
        flip in any::<prop::sample::Index>(),
    ) {
        let env = SeededEnv::new(seed);
        let now = Instant::now();
        let (mut client, mut server, result) = connect(shared_keys(2), shared_keys(2), &env, now);
        prop_assert!(result.is_ok());

        let frame = client.seal(&message, &env).unwrap();
        let mut payload = frame.payload.to_vec();
        let index = flip.index(payload.len());
        payload[index] ^= 0x01;
        let tampered = Frame::new(frame.header, payload);

        prop_assert!(server.handle_frame(&tampered, &env, now).is_err());
    }
}
