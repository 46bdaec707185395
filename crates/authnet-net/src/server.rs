//! TCP server accepting authenticated connections.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use authnet_core::SERVER;
use authnet_crypto::SharedKeys;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Semaphore,
};

use crate::{config::ServerConfig, connection::SecureConnection, error::NetError};

/// First pause after a failed `accept`.
const ACCEPT_BACKOFF_INITIAL: Duration = Duration::from_millis(10);

/// Longest pause between `accept` retries.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Production authnet server.
///
/// Every accepted TCP connection must complete the handshake with the shared
/// keys before the application sees it.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    keys: SharedKeys,
    config: ServerConfig,
    slots: Arc<Semaphore>,
}

impl Server {
    /// Bind a listener on `config.bind_address`.
    ///
    /// # Errors
    ///
    /// - `NetError::Config` if the address is invalid or cannot be bound
    pub async fn bind(config: ServerConfig, keys: SharedKeys) -> Result<Self, NetError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            NetError::Config(format!("failed to bind '{}': {e}", config.bind_address))
        })?;

        tracing::info!("listening on {}", listener.local_addr()?);

        let slots = Arc::new(Semaphore::new(config.max_connections));
        Ok(Self { listener, keys, config, slots })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one TCP connection and authenticate it.
    ///
    /// # Errors
    ///
    /// - `NetError::Io` if accepting fails
    /// - Any handshake error from [`SecureConnection::establish`]
    pub async fn accept(&self) -> Result<SecureConnection, NetError> {
        let (stream, peer_addr) = self.listener.accept().await?;
        tracing::debug!(%peer_addr, "accepted TCP connection");

        establish(stream, peer_addr, self.keys.clone(), &self.config).await
    }

    /// Accept connections until the first one authenticates.
    ///
    /// Peers failing the handshake are logged and dropped.
    ///
    /// # Errors
    ///
    /// - `NetError::Io` if the listener fails
    pub async fn accept_authenticated(&self) -> Result<SecureConnection, NetError> {
        loop {
            match self.accept().await {
                Ok(conn) => return Ok(conn),
                Err(NetError::Io(e)) => return Err(NetError::Io(e)),
                Err(e) => tracing::warn!("rejected connection: {e}"),
            }
        }
    }

    /// Run the accept loop, handing each authenticated connection to
    /// `handler` in its own task.
    ///
    /// At most `max_connections` connections are handshaking or being handled
    /// at once; excess connections are dropped immediately.
    pub async fn run<F, Fut>(self, handler: F) -> Result<(), NetError>
    where
        F: Fn(SecureConnection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("server starting on {}", self.local_addr()?);

        let handler = Arc::new(handler);
        let mut backoff = AcceptBackoff::default();

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => {
                    backoff.reset();
                    accepted
                },
                Err(e) => {
                    // Persistent failures (e.g. out of file descriptors) would spin
                    let delay = backoff.next_delay();
                    tracing::error!("accept error: {e}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    continue;
                },
            };

            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                tracing::warn!(%peer_addr, "connection limit reached, dropping");
                continue;
            };

            let handler = Arc::clone(&handler);
            let keys = self.keys.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                let _permit = permit;

                match establish(stream, peer_addr, keys, &config).await {
                    Ok(conn) => (*handler)(conn).await,
                    Err(e) => tracing::warn!(%peer_addr, "handshake failed: {e}"),
                }
            });
        }
    }
}

async fn establish(
    stream: TcpStream,
    peer_addr: SocketAddr,
    keys: SharedKeys,
    config: &ServerConfig,
) -> Result<SecureConnection, NetError> {
    stream.set_nodelay(true)?;
    SecureConnection::establish(stream, peer_addr, SERVER, keys, config.auth.clone()).await
}

/// Exponential pause between failed `accept` calls.
#[derive(Debug, Default)]
struct AcceptBackoff {
    current: Option<Duration>,
}

impl AcceptBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => ACCEPT_BACKOFF_INITIAL,
            Some(previous) => previous.saturating_mul(2).min(ACCEPT_BACKOFF_MAX),
        };
        self.current = Some(delay);
        delay
    }

    fn reset(&mut self) {
        self.current = None;
    }
}
