//! Established sessions over a byte stream.
//!
//! [`SecureConnection::establish`] runs the handshake on the caller's task,
//! then hands the session to a background task that owns the [`AuthSocket`]
//! and bridges it to channels:
//!
//! ```text
//!            ┌──────────────┐  frames   ┌──────────────────────────────┐
//!  socket ──>│ reader task  │──────────>│                              │
//!            └──────────────┘           │  session task                │  Deliver
//!                                       │  select! {                   │─────────> recv()
//!  send() / close() ── Command ────────>│    frame, command, tick      │
//!                                       │  }                           │
//!  socket <──────────── write_frame ────│                              │
//!                                       └──────────────────────────────┘
//! ```
//!
//! Reads happen in their own task because [`read_frame`] is not
//! cancel-safe.
//!
//! Decrypted messages wait in a small pending queue until the handle has room
//! for them. While anything is pending the session task stops pulling frames,
//! so a slow reader pushes back on the peer's writes without stalling its own
//! sends, heartbeats or timeouts.

use std::{collections::VecDeque, net::SocketAddr, time::Duration};

use authnet_core::{AuthAction, AuthConfig, AuthError, AuthSocket, Role, env::Environment};
use authnet_crypto::SharedKeys;
use authnet_proto::Frame;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{
    error::NetError,
    system_env::SystemEnv,
    transport::{read_frame, write_frame},
};

/// Upper bound on the session task's maintenance tick.
const MAX_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Buffered inbound frames and delivered messages per connection.
const CHANNEL_CAPACITY: usize = 32;

/// Bound on best-effort writes made while giving up on a peer.
const ABORT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Requests from the handle to the session task.
enum Command {
    Send { data: Vec<u8>, reply: oneshot::Sender<Result<(), NetError>> },
    Close { reason: String },
}

/// An authenticated, encrypted connection.
///
/// Created by [`crate::Server::accept`], [`crate::Client::connect`] or
/// [`crate::simple_socket`]. Dropping the handle closes the session with a
/// Goodbye.
#[derive(Debug)]
pub struct SecureConnection {
    commands: mpsc::Sender<Command>,
    messages: mpsc::Receiver<Vec<u8>>,
    session_id: u64,
    peer_addr: SocketAddr,
    role: Role,
    peer_id: Option<String>,
}

impl SecureConnection {
    /// Run the handshake over `stream` and start the session task.
    ///
    /// The whole handshake is bounded by `config.handshake_timeout`. On
    /// failure the peer is sent an Error frame when possible.
    ///
    /// # Errors
    ///
    /// - `NetError::HandshakeTimeout` if the peer is too slow
    /// - `NetError::Auth` if the peer fails authentication or misbehaves
    /// - `NetError::Closed` if the peer disconnects or reports an error
    /// - `NetError::Io` / `NetError::Protocol` on transport failure
    pub async fn establish<S>(
        stream: S,
        peer_addr: SocketAddr,
        role: Role,
        keys: SharedKeys,
        config: AuthConfig,
    ) -> Result<Self, NetError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let env = SystemEnv::new();
        let handshake_timeout = config.handshake_timeout;
        let tick_interval = config.heartbeat_interval.min(MAX_TICK_INTERVAL);

        let (reader, mut writer) = tokio::io::split(stream);
        let (frames_tx, mut frames) = mpsc::channel(CHANNEL_CAPACITY);
        let reader_task = tokio::spawn(read_loop(reader, frames_tx));

        let mut socket = AuthSocket::new(role, keys, config, env.now());

        let outcome = tokio::time::timeout(
            handshake_timeout,
            handshake(&mut socket, &env, &mut frames, &mut writer),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(_) => {
                let elapsed = handshake_timeout;
                abort(&mut socket, &mut writer, AuthError::HandshakeTimeout { elapsed }).await;
                Some(NetError::HandshakeTimeout(elapsed))
            },
        };

        if let Some(err) = failure {
            reader_task.abort();
            let _ = writer.shutdown().await;
            return Err(err);
        }

        let session_id = socket.session_id().unwrap_or_default();
        let peer_id = socket.peer_id().map(str::to_owned);

        tracing::info!(session_id, %peer_addr, %role, "session established");

        let (commands_tx, commands) = mpsc::channel(CHANNEL_CAPACITY);
        let (messages_tx, messages) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(run_session(Session {
            socket,
            env,
            frames,
            writer,
            commands,
            messages: messages_tx,
            pending: VecDeque::new(),
            reader_task,
            tick_interval,
            session_id,
        }));

        Ok(Self { commands: commands_tx, messages, session_id, peer_addr, role, peer_id })
    }

    /// Encrypt and send one message.
    ///
    /// Completes once the frame has been written to the socket.
    ///
    /// # Errors
    ///
    /// - `NetError::Closed` if the session has ended
    /// - `NetError::Auth` if the message is too large
    /// - `NetError::Io` if the write fails (the session is then closed)
    pub async fn send(&self, data: &[u8]) -> Result<(), NetError> {
        let (reply, done) = oneshot::channel();
        let command = Command::Send { data: data.to_vec(), reply };

        self.commands.send(command).await.map_err(|_| closed())?;
        done.await.map_err(|_| closed())?
    }

    /// Receive the next message. `None` once the session has closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.messages.recv().await
    }

    /// Close gracefully, telling the peer with a Goodbye.
    ///
    /// Returns once the session task has exited. Undelivered messages are
    /// discarded.
    pub async fn close(&mut self) {
        let _ = self.commands.send(Command::Close { reason: "closed by user".to_string() }).await;
        while self.messages.recv().await.is_some() {}
    }

    /// Session ID assigned during the handshake.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Remote socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Role of this end.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Name the client reported in its Hello (server side only).
    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }
}

fn closed() -> NetError {
    NetError::Closed("session task has exited".to_string())
}

/// Forward frames from the socket until EOF or error.
async fn read_loop<R>(mut reader: ReadHalf<R>, frames: mpsc::Sender<Result<Frame, NetError>>)
where
    R: AsyncRead,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if frames.send(Ok(frame)).await.is_err() {
                    break;
                }
            },
            Ok(None) => break,
            Err(err) => {
                let _ = frames.send(Err(err)).await;
                break;
            },
        }
    }
}

/// Drive the socket until it is established.
async fn handshake<W, E>(
    socket: &mut AuthSocket,
    env: &E,
    frames: &mut mpsc::Receiver<Result<Frame, NetError>>,
    writer: &mut WriteHalf<W>,
) -> Result<(), NetError>
where
    W: AsyncWrite,
    E: Environment<Instant = std::time::Instant>,
{
    if socket.role() == Role::Client {
        let actions = socket.start(env, env.now())?;
        execute_handshake_actions(actions, writer).await?;
    }

    while !socket.is_established() {
        let frame = match frames.recv().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => return Err(err),
            None => return Err(NetError::Closed("peer disconnected during handshake".to_string())),
        };

        match socket.handle_frame(&frame, env, env.now()) {
            Ok(actions) => execute_handshake_actions(actions, writer).await?,
            Err(err) => return Err(abort(socket, writer, err).await),
        }
    }

    Ok(())
}

async fn execute_handshake_actions<W: AsyncWrite>(
    actions: Vec<AuthAction>,
    writer: &mut WriteHalf<W>,
) -> Result<(), NetError> {
    for action in actions {
        match action {
            AuthAction::Send(frame) => write_frame(writer, &frame).await?,
            AuthAction::Close { reason } => return Err(NetError::Closed(reason)),
            // Data cannot arrive before the session is established
            AuthAction::Deliver(_) => {},
        }
    }

    Ok(())
}

/// Report `err` to the peer (best effort) and return it.
///
/// The report is bounded by [`ABORT_WRITE_TIMEOUT`] so a peer that stopped
/// reading cannot hold the caller.
async fn abort<W: AsyncWrite>(
    socket: &mut AuthSocket,
    writer: &mut WriteHalf<W>,
    err: AuthError,
) -> NetError {
    for action in socket.abort(&err) {
        if let AuthAction::Send(frame) = action {
            let write = write_frame(writer, &frame);
            if tokio::time::timeout(ABORT_WRITE_TIMEOUT, write).await.is_err() {
                tracing::debug!("peer not reading, dropping error report");
                break;
            }
        }
    }

    NetError::Auth(err)
}

/// State owned by the session task.
struct Session<S, E: Environment> {
    socket: AuthSocket<E::Instant>,
    env: E,
    frames: mpsc::Receiver<Result<Frame, NetError>>,
    writer: WriteHalf<S>,
    commands: mpsc::Receiver<Command>,
    messages: mpsc::Sender<Vec<u8>>,
    /// Decrypted messages waiting for room in `messages`
    pending: VecDeque<Vec<u8>>,
    reader_task: JoinHandle<()>,
    tick_interval: Duration,
    session_id: u64,
}

async fn run_session<S, E>(mut session: Session<S, E>)
where
    S: AsyncWrite,
    E: Environment,
{
    let session_id = session.session_id;
    let mut ticker = tokio::time::interval(session.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let actions = tokio::select! {
            permit = session.messages.reserve(), if !session.pending.is_empty() => {
                match permit {
                    Ok(permit) => {
                        if let Some(data) = session.pending.pop_front() {
                            permit.send(data);
                        }
                    },
                    // Handle dropped; its Close command is queued
                    Err(_) => session.pending.clear(),
                }
                continue;
            },

            inbound = session.frames.recv(), if session.pending.is_empty() => match inbound {
                Some(Ok(frame)) => {
                    let now = session.env.now();
                    match session.socket.handle_frame(&frame, &session.env, now) {
                        Ok(actions) => actions,
                        Err(err) => {
                            tracing::warn!(session_id, "rejecting frame: {err}");
                            session.socket.abort(&err)
                        },
                    }
                },
                Some(Err(err)) => {
                    tracing::debug!(session_id, "read error: {err}");
                    break;
                },
                None => {
                    tracing::debug!(session_id, "peer disconnected");
                    break;
                },
            },

            command = session.commands.recv() => match command {
                Some(Command::Send { data, reply }) => {
                    let result = match session.socket.seal(&data, &session.env) {
                        Ok(frame) => write_frame(&mut session.writer, &frame).await,
                        Err(err) => Err(err.into()),
                    };
                    let fatal = matches!(result, Err(NetError::Io(_)));
                    let _ = reply.send(result);
                    if fatal {
                        break;
                    }
                    continue;
                },
                Some(Command::Close { reason }) => session.socket.close(&reason),
                None => session.socket.close("connection dropped"),
            },

            _ = ticker.tick() => session.socket.tick(session.env.now()),
        };

        if !execute_session_actions(actions, &mut session).await {
            break;
        }
    }

    session.reader_task.abort();
    let _ = session.writer.shutdown().await;

    // Deliver what was decrypted before the session ended
    while let Some(data) = session.pending.pop_front() {
        if session.messages.send(data).await.is_err() {
            break;
        }
    }

    tracing::debug!(session_id, "session task finished");
}

/// Returns false once the session should stop.
async fn execute_session_actions<S, E>(actions: Vec<AuthAction>, session: &mut Session<S, E>) -> bool
where
    S: AsyncWrite,
    E: Environment,
{
    let session_id = session.session_id;
    let mut open = true;

    for action in actions {
        match action {
            AuthAction::Send(frame) => {
                if let Err(err) = write_frame(&mut session.writer, &frame).await {
                    tracing::debug!(session_id, "write error: {err}");
                    return false;
                }
            },
            AuthAction::Deliver(data) => session.pending.push_back(data),
            AuthAction::Close { reason } => {
                tracing::info!(session_id, %reason, "session closed");
                open = false;
            },
        }
    }

    open
}

#[cfg(test)]
mod tests {
    use authnet_core::{CLIENT, SERVER};
    use authnet_crypto::{HmacKey, Key};

    use super::*;

    fn keys() -> SharedKeys {
        SharedKeys::new(Key::from_bytes([4; 32]), HmacKey::from_bytes([5; 32]))
    }

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    async fn pair(config: AuthConfig) -> (SecureConnection, SecureConnection) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(SecureConnection::establish(
            a,
            addr(),
            SERVER,
            keys(),
            config.clone(),
        ));
        let client = SecureConnection::establish(b, addr(), CLIENT, keys(), config).await.unwrap();
        let server = server.await.unwrap().unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn exchange_over_duplex() {
        let (client, mut server) = pair(AuthConfig::default()).await;

        assert_eq!(client.session_id(), server.session_id());
        assert_eq!(client.role(), CLIENT);
        assert_eq!(server.role(), SERVER);

        client.send(b"ping").await.unwrap();
        assert_eq!(server.recv().await, Some(b"ping".to_vec()));
    }

    #[tokio::test]
    async fn dropping_handle_closes_peer() {
        let (client, mut server) = pair(AuthConfig::default()).await;

        drop(client);
        assert_eq!(server.recv().await, None);
        assert!(matches!(server.send(b"late").await, Err(NetError::Closed(_))));
    }

    #[tokio::test]
    async fn silent_peer_times_out_handshake() {
        let (a, _b) = tokio::io::duplex(1024);
        let config =
            AuthConfig { handshake_timeout: Duration::from_millis(50), ..AuthConfig::default() };

        let result = SecureConnection::establish(a, addr(), SERVER, keys(), config).await;
        assert!(matches!(result, Err(NetError::HandshakeTimeout(_))));
    }

    #[tokio::test]
    async fn timeout_report_does_not_wait_on_stalled_peer() {
        // One-byte pipe that nobody drains: the Error frame can never be written
        let (a, _b) = tokio::io::duplex(1);
        let config =
            AuthConfig { handshake_timeout: Duration::from_millis(50), ..AuthConfig::default() };

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            SecureConnection::establish(a, addr(), SERVER, keys(), config),
        )
        .await
        .expect("establish must give up on a peer that never reads");

        assert!(matches!(result, Err(NetError::HandshakeTimeout(_))));
    }

    #[tokio::test]
    async fn disconnect_during_handshake() {
        let (a, b) = tokio::io::duplex(1024);
        drop(b);

        let result =
            SecureConnection::establish(a, addr(), SERVER, keys(), AuthConfig::default()).await;
        assert!(matches!(result, Err(NetError::Closed(_))));
    }

    #[tokio::test]
    async fn oversized_send_is_rejected_without_closing() {
        let (client, mut server) = pair(AuthConfig::default()).await;

        let big = vec![0u8; authnet_core::MAX_MESSAGE_SIZE + 1];
        assert!(matches!(
            client.send(&big).await,
            Err(NetError::Auth(AuthError::MessageTooLarge { .. }))
        ));

        client.send(b"still open").await.unwrap();
        assert_eq!(server.recv().await, Some(b"still open".to_vec()));
    }
}
