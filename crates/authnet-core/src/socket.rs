//! Authenticating session state machine.
//!
//! Runs the pre-shared-key handshake, then protects application data. Uses
//! the action pattern: methods take time (and an [`Environment`] for
//! randomness) as input and return actions for the driver to execute. The
//! state machine performs no I/O.
//!
//! # State Machine
//!
//! ```text
//!  client                                            server
//! ┌──────┐ start  ┌───────────────────┐            ┌──────┐
//! │ Init │───────>│ AwaitingChallenge │            │ Init │
//! └──────┘ Hello  └───────────────────┘            └──────┘
//!                        │ Challenge                   │ Hello
//!                        ↓ (verify server proof)       ↓ (send Challenge)
//!                 ┌────────────────┐           ┌──────────────────┐
//!                 │ AwaitingAccept │           │ AwaitingResponse │
//!                 └────────────────┘           └──────────────────┘
//!                        │ Accept                      │ Response
//!                        ↓                             ↓ (verify client proof)
//!                 ┌─────────────┐               ┌─────────────┐
//!                 │ Established │<── Data ────> │ Established │
//!                 └─────────────┘               └─────────────┘
//!
//!  any state ── Goodbye / Error / timeout ──> Closed
//! ```

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use authnet_crypto::{
    MessageKeys, SecureMessage, SessionKeys, SharedKeys, Transcript, client_proof,
    derive_session_keys, server_proof, verify_client_proof, verify_server_proof,
};
use authnet_proto::{
    ErrorPayload, Frame, FrameHeader, Opcode, Payload,
    payloads::session::{Challenge, Goodbye, Hello, PROTOCOL_VERSION, Response},
};

use crate::{Role, env::Environment, error::AuthError};

/// Time allowed to complete the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time allowed without any inbound traffic before the session is
/// closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which an established session sends Ping frames.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Largest plaintext accepted by [`AuthSocket::seal`].
///
/// Leaves headroom below the frame limit for CBOR and envelope overhead.
pub const MAX_MESSAGE_SIZE: usize = FrameHeader::MAX_PAYLOAD_SIZE as usize - 4096;

/// Actions returned by the session state machine.
///
/// The driver executes these in order:
/// - `Send`: Serialize and write the frame to the peer
/// - `Deliver`: Hand decrypted application bytes to the user
/// - `Close`: Shut the transport down with the given reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAction {
    /// Send this frame to the peer
    Send(Frame),

    /// Authenticated plaintext received from the peer
    Deliver(Vec<u8>),

    /// Close the connection with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing sent or received yet
    Init,
    /// Client sent Hello, waiting for Challenge
    AwaitingChallenge,
    /// Server sent Challenge, waiting for Response
    AwaitingResponse,
    /// Client sent Response, waiting for Accept
    AwaitingAccept,
    /// Both sides authenticated, data may flow
    Established,
    /// Session closed (graceful or error)
    Closed,
}

impl AuthState {
    /// Whether the handshake is still in progress.
    #[must_use]
    pub fn is_handshaking(self) -> bool {
        matches!(self, Self::AwaitingChallenge | Self::AwaitingResponse | Self::AwaitingAccept)
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Timeout for completing the handshake, measured from socket creation
    pub handshake_timeout: Duration,
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < `idle_timeout` / 2)
    pub heartbeat_interval: Duration,
    /// Name a client reports in Hello. Ignored for servers.
    pub client_id: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            client_id: None,
        }
    }
}

/// Authenticating socket state machine
///
/// Owns the pre-shared keys, the handshake transcript and the per-session
/// keys for one connection. Generic over `Instant` to support both real and
/// virtual time.
///
/// # Invariants
///
/// - Data is only sealed or opened in [`AuthState::Established`]
/// - Outbound sequence numbers start at 0 and increase by one per message
/// - Inbound messages are accepted only with exactly the next expected
///   sequence number; anything else is a replay or reordering
#[derive(Debug)]
pub struct AuthSocket<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    role: Role,
    state: AuthState,
    config: AuthConfig,
    keys: SharedKeys,
    /// Socket creation time (handshake deadline reference)
    created_at: I,
    /// Last inbound frame
    last_activity: I,
    last_heartbeat: Option<I>,
    session_id: Option<u64>,
    client_nonce: Option<[u8; 32]>,
    transcript: Option<Transcript>,
    session: Option<SessionKeys>,
    send_sequence: u64,
    recv_sequence: u64,
    peer_id: Option<String>,
}

impl<I> AuthSocket<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new socket in [`AuthState::Init`].
    pub fn new(role: Role, keys: SharedKeys, config: AuthConfig, now: I) -> Self {
        Self {
            role,
            state: AuthState::Init,
            config,
            keys,
            created_at: now,
            last_activity: now,
            last_heartbeat: None,
            session_id: None,
            client_nonce: None,
            transcript: None,
            session: None,
            send_sequence: 0,
            recv_sequence: 0,
            peer_id: None,
        }
    }

    /// Role this socket plays.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Whether application data may flow.
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.state == AuthState::Established
    }

    /// Session ID assigned by the server. `None` before the Challenge.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Name the client reported in Hello (server side only).
    #[must_use]
    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    /// Number of data messages sealed so far.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.send_sequence
    }

    /// Number of data messages accepted so far.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.recv_sequence
    }

    /// Open the handshake (client use).
    ///
    /// Transitions to `AwaitingChallenge` and returns Send(Hello).
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` if not a client in Init state
    pub fn start<E: Environment>(
        &mut self,
        env: &E,
        now: I,
    ) -> Result<Vec<AuthAction>, AuthError> {
        if self.role != Role::Client || self.state != AuthState::Init {
            return Err(AuthError::InvalidState { state: self.state, operation: "start" });
        }

        let client_nonce = env.random_array();
        let hello = Payload::Hello(Hello {
            version: PROTOCOL_VERSION,
            client_nonce,
            client_id: self.config.client_id.clone(),
        });
        let frame = hello.into_frame(FrameHeader::new(Opcode::Hello))?;

        self.client_nonce = Some(client_nonce);
        self.state = AuthState::AwaitingChallenge;
        self.last_activity = now;

        Ok(vec![AuthAction::Send(frame)])
    }

    /// Process an incoming frame and update state.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnexpectedFrame` if opcode invalid for role and state
    /// - `AuthError::UnsupportedVersion` if Hello version ≠ 1
    /// - `AuthError::AuthenticationFailed` if a handshake proof is wrong
    /// - `AuthError::SessionMismatch` if the header names another session
    /// - `AuthError::Replay` if a Data frame is out of sequence
    /// - `AuthError::Crypto` if a Data frame fails verification
    /// - `AuthError::Protocol` if the payload cannot be decoded
    pub fn handle_frame<E: Environment>(
        &mut self,
        frame: &Frame,
        env: &E,
        now: I,
    ) -> Result<Vec<AuthAction>, AuthError> {
        if self.state == AuthState::Closed {
            return Err(AuthError::InvalidState { state: self.state, operation: "handle frame" });
        }

        let Some(opcode) = frame.header.opcode_enum() else {
            return Err(self.unexpected(frame));
        };

        if let Some(expected) = self.session_id {
            let actual = frame.header.session_id();
            if !matches!(opcode, Opcode::Goodbye | Opcode::Error) && actual != expected {
                return Err(AuthError::SessionMismatch { expected, actual });
            }
        }

        self.last_activity = now;

        match (self.role, self.state, opcode) {
            (Role::Server, AuthState::Init, Opcode::Hello) => self.on_hello(frame, env),
            (Role::Client, AuthState::AwaitingChallenge, Opcode::Challenge) => {
                self.on_challenge(frame)
            },
            (Role::Server, AuthState::AwaitingResponse, Opcode::Response) => {
                self.on_response(frame)
            },
            (Role::Client, AuthState::AwaitingAccept, Opcode::Accept) => {
                self.state = AuthState::Established;
                Ok(vec![])
            },

            (_, AuthState::Established, Opcode::Data) => self.on_data(frame),
            (_, AuthState::Established, Opcode::Ping) => {
                Ok(vec![AuthAction::Send(Frame::new(self.header(Opcode::Pong), Vec::new()))])
            },
            // Activity already updated
            (_, AuthState::Established, Opcode::Pong) => Ok(vec![]),

            (_, _, Opcode::Goodbye) => {
                let Payload::Goodbye(goodbye) = Payload::from_frame(frame)? else {
                    return Err(self.unexpected(frame));
                };

                self.state = AuthState::Closed;

                let ack = Payload::Goodbye(Goodbye { reason: "ack".to_string() })
                    .into_frame(self.header(Opcode::Goodbye))?;

                Ok(vec![AuthAction::Send(ack), AuthAction::Close {
                    reason: format!("peer goodbye: {}", goodbye.reason),
                }])
            },

            (_, _, Opcode::Error) => {
                self.state = AuthState::Closed;

                let reason = match Payload::from_frame(frame) {
                    Ok(Payload::Error(error)) => {
                        format!("peer error {:#06x}: {}", error.code, error.message)
                    },
                    _ => "peer error".to_string(),
                };

                Ok(vec![AuthAction::Close { reason }])
            },

            _ => Err(self.unexpected(frame)),
        }
    }

    /// Encrypt application data into a Data frame.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidState` if the session is not established
    /// - `AuthError::MessageTooLarge` if `plaintext` exceeds
    ///   [`MAX_MESSAGE_SIZE`]
    /// - `AuthError::SequenceExhausted` after `u64::MAX` messages
    pub fn seal<E: Environment>(&mut self, plaintext: &[u8], env: &E) -> Result<Frame, AuthError> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(AuthError::MessageTooLarge { size: plaintext.len(), max: MAX_MESSAGE_SIZE });
        }

        let Some(keys) = self.send_keys() else {
            return Err(AuthError::InvalidState { state: self.state, operation: "seal" });
        };

        if self.send_sequence == u64::MAX {
            return Err(AuthError::SequenceExhausted);
        }

        let message = SecureMessage::seal(plaintext, keys, self.send_sequence, env.random_array());
        let frame = Payload::Data(message).into_frame(self.header(Opcode::Data))?;

        self.send_sequence += 1;

        Ok(frame)
    }

    /// Elapsed time if a timeout has been exceeded. `None` otherwise.
    ///
    /// A server waiting for Hello counts as handshaking; a client that has
    /// not called [`Self::start`] does not.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<AuthError> {
        let waiting_for_hello = self.role == Role::Server && self.state == AuthState::Init;

        if waiting_for_hello || self.state.is_handshaking() {
            let elapsed = now - self.created_at;
            if elapsed > self.config.handshake_timeout {
                return Some(AuthError::HandshakeTimeout { elapsed });
            }
        } else if self.state == AuthState::Established {
            let elapsed = now - self.last_activity;
            if elapsed > self.config.idle_timeout {
                return Some(AuthError::IdleTimeout { elapsed });
            }
        }

        None
    }

    /// Process periodic maintenance (timeouts and heartbeats).
    pub fn tick(&mut self, now: I) -> Vec<AuthAction> {
        if let Some(error) = self.check_timeout(now) {
            return self.abort(&error);
        }

        if self.state != AuthState::Established {
            return Vec::new();
        }

        let should_send = match self.last_heartbeat {
            None => now - self.last_activity >= self.config.heartbeat_interval,
            Some(last) => now - last >= self.config.heartbeat_interval,
        };

        if !should_send {
            return Vec::new();
        }

        self.last_heartbeat = Some(now);
        vec![AuthAction::Send(Frame::new(self.header(Opcode::Ping), Vec::new()))]
    }

    /// Close gracefully with a Goodbye.
    pub fn close(&mut self, reason: &str) -> Vec<AuthAction> {
        if self.state == AuthState::Closed {
            return Vec::new();
        }

        self.state = AuthState::Closed;

        let goodbye = Payload::Goodbye(Goodbye { reason: reason.to_string() });
        let mut actions = Vec::with_capacity(2);
        if let Ok(frame) = goodbye.into_frame(self.header(Opcode::Goodbye)) {
            actions.push(AuthAction::Send(frame));
        }
        actions.push(AuthAction::Close { reason: reason.to_string() });
        actions
    }

    /// Report `error` to the peer and close.
    ///
    /// Drivers call this when [`Self::handle_frame`] fails or a timeout
    /// fires.
    pub fn abort(&mut self, error: &AuthError) -> Vec<AuthAction> {
        if self.state == AuthState::Closed {
            return Vec::new();
        }

        self.state = AuthState::Closed;

        let payload = match error {
            AuthError::AuthenticationFailed(reason) => ErrorPayload::auth_failed(*reason),
            AuthError::UnsupportedVersion(version) => ErrorPayload::unsupported_version(*version),
            AuthError::Replay { .. } | AuthError::SessionMismatch { .. } | AuthError::Crypto(_) => {
                ErrorPayload::integrity_failure(error.to_string())
            },
            AuthError::HandshakeTimeout { .. } | AuthError::IdleTimeout { .. } => {
                ErrorPayload::timeout(error.to_string())
            },
            _ => ErrorPayload::protocol_violation(error.to_string()),
        };

        let mut actions = Vec::with_capacity(2);
        if let Ok(frame) = Payload::Error(payload).into_frame(self.header(Opcode::Error)) {
            actions.push(AuthAction::Send(frame));
        }
        actions.push(AuthAction::Close { reason: error.to_string() });
        actions
    }

    /// Server: answer Hello with a Challenge.
    fn on_hello<E: Environment>(
        &mut self,
        frame: &Frame,
        env: &E,
    ) -> Result<Vec<AuthAction>, AuthError> {
        let Payload::Hello(hello) = Payload::from_frame(frame)? else {
            return Err(self.unexpected(frame));
        };

        if hello.version != PROTOCOL_VERSION {
            return Err(AuthError::UnsupportedVersion(hello.version));
        }

        // Zero is reserved for "no session" in frame headers
        let session_id = env.random_u64().max(1);
        let transcript =
            Transcript { client_nonce: hello.client_nonce, server_nonce: env.random_array(), session_id };
        let proof = server_proof(&self.keys.hmac_key, &transcript);

        self.session_id = Some(session_id);
        self.transcript = Some(transcript);
        self.peer_id = hello.client_id;
        self.state = AuthState::AwaitingResponse;

        let challenge =
            Payload::Challenge(Challenge { session_id, server_nonce: transcript.server_nonce, proof });

        Ok(vec![AuthAction::Send(challenge.into_frame(self.header(Opcode::Challenge))?)])
    }

    /// Client: verify the server, derive keys, send our proof.
    fn on_challenge(&mut self, frame: &Frame) -> Result<Vec<AuthAction>, AuthError> {
        let Payload::Challenge(challenge) = Payload::from_frame(frame)? else {
            return Err(self.unexpected(frame));
        };

        let Some(client_nonce) = self.client_nonce else {
            return Err(AuthError::InvalidState { state: self.state, operation: "verify challenge" });
        };

        if challenge.session_id == 0 {
            return Err(AuthError::AuthenticationFailed("server assigned session id 0"));
        }

        let transcript = Transcript {
            client_nonce,
            server_nonce: challenge.server_nonce,
            session_id: challenge.session_id,
        };

        verify_server_proof(&self.keys.hmac_key, &transcript, &challenge.proof)
            .map_err(|_| AuthError::AuthenticationFailed("server proof did not verify"))?;

        self.session_id = Some(challenge.session_id);
        self.session = Some(derive_session_keys(&self.keys, &transcript));
        self.transcript = Some(transcript);
        self.state = AuthState::AwaitingAccept;

        let response = Payload::Response(Response { proof: client_proof(&self.keys.hmac_key, &transcript) });

        Ok(vec![AuthAction::Send(response.into_frame(self.header(Opcode::Response))?)])
    }

    /// Server: verify the client and confirm the session.
    fn on_response(&mut self, frame: &Frame) -> Result<Vec<AuthAction>, AuthError> {
        let Payload::Response(response) = Payload::from_frame(frame)? else {
            return Err(self.unexpected(frame));
        };

        let Some(transcript) = self.transcript else {
            return Err(AuthError::InvalidState { state: self.state, operation: "verify response" });
        };

        verify_client_proof(&self.keys.hmac_key, &transcript, &response.proof)
            .map_err(|_| AuthError::AuthenticationFailed("client proof did not verify"))?;

        self.session = Some(derive_session_keys(&self.keys, &transcript));
        self.state = AuthState::Established;

        Ok(vec![AuthAction::Send(Frame::new(self.header(Opcode::Accept), Vec::new()))])
    }

    /// Both: verify sequence and tag, then decrypt.
    fn on_data(&mut self, frame: &Frame) -> Result<Vec<AuthAction>, AuthError> {
        let Payload::Data(message) = Payload::from_frame(frame)? else {
            return Err(self.unexpected(frame));
        };

        if message.sequence != self.recv_sequence {
            return Err(AuthError::Replay { expected: self.recv_sequence, actual: message.sequence });
        }

        let Some(keys) = self.recv_keys() else {
            return Err(AuthError::InvalidState { state: self.state, operation: "open" });
        };

        let plaintext = message.open(keys)?;
        self.recv_sequence = self.recv_sequence.saturating_add(1);

        Ok(vec![AuthAction::Deliver(plaintext)])
    }

    fn send_keys(&self) -> Option<&MessageKeys> {
        if self.state != AuthState::Established {
            return None;
        }
        let session = self.session.as_ref()?;
        Some(match self.role {
            Role::Client => &session.client_to_server,
            Role::Server => &session.server_to_client,
        })
    }

    fn recv_keys(&self) -> Option<&MessageKeys> {
        let session = self.session.as_ref()?;
        Some(match self.role {
            Role::Client => &session.server_to_client,
            Role::Server => &session.client_to_server,
        })
    }

    fn header(&self, opcode: Opcode) -> FrameHeader {
        FrameHeader::new(opcode).with_session_id(self.session_id.unwrap_or(0))
    }

    fn unexpected(&self, frame: &Frame) -> AuthError {
        AuthError::UnexpectedFrame { state: self.state, opcode: frame.header.opcode() }
    }
}
