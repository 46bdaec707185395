//! Fuzz target for the AuthSocket state machine
//!
//! Drives a client and a server through a real handshake, then lets the
//! fuzzer inject, tamper with, replay and reorder frames in both directions.
//!
//! # Invariants
//!
//! - The state machine never panics on any frame sequence
//! - Only plaintext actually sealed by the peer is ever delivered
//! - Delivered messages arrive in the order they were sealed
//! - Errors close the session; nothing is delivered after Closed

#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use authnet_core::{
    AuthAction, AuthConfig, AuthSocket, AuthState, CLIENT, SERVER, env::Environment,
};
use authnet_crypto::{HmacKey, Key, SharedKeys};
use authnet_proto::Frame;
use libfuzzer_sys::fuzz_target;

#[derive(Clone)]
struct FuzzEnv {
    seed: u8,
}

impl Environment for FuzzEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.seed.wrapping_add(i as u8);
        }
    }
}

#[derive(Debug, Arbitrary)]
enum Step {
    /// Client seals a message for the server
    ClientSend(Vec<u8>),
    /// Server seals a message for the client
    ServerSend(Vec<u8>),
    /// Deliver the oldest in-flight frame
    Deliver { to_server: bool },
    /// Deliver the in-flight frame at an arbitrary position (reordering)
    DeliverAt { to_server: bool, index: u8 },
    /// Re-deliver the last frame seen by one side (replay)
    Replay { to_server: bool },
    /// Flip a bit in the oldest in-flight frame's payload
    Tamper { to_server: bool, offset: u16, bit: u8 },
    /// Inject raw bytes as a frame
    Inject { to_server: bool, bytes: Vec<u8> },
    /// Advance time
    Tick { seconds: u8 },
}

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u8,
    steps: Vec<Step>,
}

struct Side {
    socket: AuthSocket,
    inbox: Vec<Frame>,
    last_seen: Option<Frame>,
    expected: Vec<Vec<u8>>,
    delivered: usize,
}

impl Side {
    fn receive(&mut self, frame: Frame, env: &FuzzEnv, now: Instant) -> Vec<Frame> {
        let state_before = self.socket.state();
        self.last_seen = Some(frame.clone());

        let actions = match self.socket.handle_frame(&frame, env, now) {
            Ok(actions) => actions,
            Err(err) => self.socket.abort(&err),
        };

        let mut outbound = Vec::new();
        for action in actions {
            match action {
                AuthAction::Send(frame) => outbound.push(frame),
                AuthAction::Deliver(data) => {
                    assert_eq!(state_before, AuthState::Established);
                    assert_eq!(Some(&data), self.expected.get(self.delivered));
                    self.delivered += 1;
                },
                AuthAction::Close { .. } => assert_eq!(self.socket.state(), AuthState::Closed),
            }
        }
        outbound
    }
}

fn sent(actions: Vec<AuthAction>) -> Vec<Frame> {
    actions
        .into_iter()
        .filter_map(|a| match a {
            AuthAction::Send(frame) => Some(frame),
            _ => None,
        })
        .collect()
}

fuzz_target!(|scenario: Scenario| {
    let env = FuzzEnv { seed: scenario.seed };
    let keys = SharedKeys::new(Key::from_bytes([1; 32]), HmacKey::from_bytes([2; 32]));
    let mut now = Instant::now();

    let mut client = Side {
        socket: AuthSocket::new(CLIENT, keys.clone(), AuthConfig::default(), now),
        inbox: Vec::new(),
        last_seen: None,
        expected: Vec::new(),
        delivered: 0,
    };
    let mut server = Side {
        socket: AuthSocket::new(SERVER, keys, AuthConfig::default(), now),
        inbox: Vec::new(),
        last_seen: None,
        expected: Vec::new(),
        delivered: 0,
    };

    server.inbox.extend(sent(client.socket.start(&env, now).expect("client starts")));

    for step in scenario.steps.into_iter().take(256) {
        match step {
            Step::ClientSend(data) => {
                if let Ok(frame) = client.socket.seal(&data, &env) {
                    server.expected.push(data);
                    server.inbox.push(frame);
                }
            },
            Step::ServerSend(data) => {
                if let Ok(frame) = server.socket.seal(&data, &env) {
                    client.expected.push(data);
                    client.inbox.push(frame);
                }
            },
            Step::Deliver { to_server } => {
                let (target, other) =
                    if to_server { (&mut server, &mut client) } else { (&mut client, &mut server) };
                if !target.inbox.is_empty() {
                    let frame = target.inbox.remove(0);
                    let replies = target.receive(frame, &env, now);
                    other.inbox.extend(replies);
                }
            },
            Step::DeliverAt { to_server, index } => {
                let (target, other) =
                    if to_server { (&mut server, &mut client) } else { (&mut client, &mut server) };
                if !target.inbox.is_empty() {
                    let frame = target.inbox.remove(index as usize % target.inbox.len());
                    let replies = target.receive(frame, &env, now);
                    other.inbox.extend(replies);
                }
            },
            Step::Replay { to_server } => {
                let (target, other) =
                    if to_server { (&mut server, &mut client) } else { (&mut client, &mut server) };
                if let Some(frame) = target.last_seen.clone() {
                    let replies = target.receive(frame, &env, now);
                    other.inbox.extend(replies);
                }
            },
            Step::Tamper { to_server, offset, bit } => {
                let target = if to_server { &mut server } else { &mut client };
                if let Some(frame) = target.inbox.first_mut() {
                    let mut payload = frame.payload.to_vec();
                    if !payload.is_empty() {
                        let index = offset as usize % payload.len();
                        payload[index] ^= 1 << (bit % 8);
                        *frame = Frame::new(frame.header, payload);
                    }
                }
            },
            Step::Inject { to_server, bytes } => {
                let target = if to_server { &mut server } else { &mut client };
                if let Ok(frame) = Frame::decode(&bytes) {
                    target.inbox.push(frame);
                }
            },
            Step::Tick { seconds } => {
                now += Duration::from_secs(u64::from(seconds));
                server.inbox.extend(sent(client.socket.tick(now)));
                client.inbox.extend(sent(server.socket.tick(now)));
            },
        }
    }
});
