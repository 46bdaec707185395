//! authnet command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Generate shared keys
//! authnet keygen --out authnet.keys
//!
//! # Echo server
//! authnet serve --bind 0.0.0.0:7000 --key-file authnet.keys
//!
//! # Send messages (keys from the environment)
//! AUTHNET_KEY=... AUTHNET_HMAC_KEY=... authnet send --connect 127.0.0.1:7000 hello world
//! ```

use std::{io::Write, path::PathBuf};

use authnet_core::AuthConfig;
use authnet_crypto::SharedKeys;
use authnet_net::{
    Client, ClientConfig, KeySource, NetError, Server, ServerConfig,
    config::{DEFAULT_BIND_ADDRESS, DEFAULT_MAX_CONNECTIONS},
    write_key_file,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Authenticated, encrypted connections with pre-shared keys
#[derive(Parser, Debug)]
#[command(name = "authnet")]
#[command(about = "A simple way to authorize and share network connections")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new pair of shared keys
    Keygen {
        /// Write the key file here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run an echo server
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = DEFAULT_BIND_ADDRESS)]
        bind: String,

        /// Maximum concurrent connections
        #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
        max_connections: usize,

        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Send messages to a server and print the echoes
    Send {
        /// Server address
        #[arg(short, long, default_value = "127.0.0.1:7000")]
        connect: String,

        /// Name reported to the server
        #[arg(long)]
        client_id: Option<String>,

        #[command(flatten)]
        keys: KeyArgs,

        /// Messages to send, one frame each
        #[arg(required = true)]
        messages: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct KeyArgs {
    /// Key file written by `authnet keygen`
    #[arg(long, env = "AUTHNET_KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Encryption key (64 hex characters)
    #[arg(long, env = "AUTHNET_KEY", hide_env_values = true)]
    key: Option<String>,

    /// HMAC key (64 hex characters)
    #[arg(long, env = "AUTHNET_HMAC_KEY", hide_env_values = true)]
    hmac_key: Option<String>,
}

impl KeyArgs {
    fn load(self) -> Result<SharedKeys, NetError> {
        KeySource::from_options(self.key_file, self.key, self.hmac_key)?.load()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    match cli.command {
        Command::Keygen { out } => keygen(out)?,
        Command::Serve { bind, max_connections, keys } => {
            serve(bind, max_connections, keys.load()?).await?;
        },
        Command::Send { connect, client_id, keys, messages } => {
            send(connect, client_id, keys.load()?, messages).await?;
        },
    }

    Ok(())
}

fn keygen(out: Option<PathBuf>) -> Result<(), NetError> {
    let keys = SharedKeys::generate()?;

    match out {
        Some(path) => {
            write_key_file(&path, &keys)?;
            tracing::info!("wrote keys to {}", path.display());
        },
        None => std::io::stdout().lock().write_all(keys.to_key_file().as_bytes())?,
    }

    Ok(())
}

async fn serve(bind: String, max_connections: usize, keys: SharedKeys) -> Result<(), NetError> {
    let config = ServerConfig { bind_address: bind, max_connections, ..ServerConfig::default() };
    let server = Server::bind(config, keys).await?;

    server
        .run(|mut conn| async move {
            let session_id = conn.session_id();
            tracing::info!(session_id, peer_id = conn.peer_id(), "echoing");

            while let Some(message) = conn.recv().await {
                if let Err(e) = conn.send(&message).await {
                    tracing::warn!(session_id, "echo failed: {e}");
                    break;
                }
            }
        })
        .await
}

async fn send(
    connect: String,
    client_id: Option<String>,
    keys: SharedKeys,
    messages: Vec<String>,
) -> Result<(), NetError> {
    let config = ClientConfig {
        server_address: connect,
        auth: AuthConfig { client_id, ..AuthConfig::default() },
        ..ClientConfig::default()
    };
    let mut conn = Client::new(config, keys).connect().await?;

    for message in messages {
        conn.send(message.as_bytes()).await?;

        let Some(echo) = conn.recv().await else {
            return Err(NetError::Closed("server closed the connection".to_string()));
        };
        writeln!(std::io::stdout().lock(), "{}", String::from_utf8_lossy(&echo))?;
    }

    conn.close().await;
    Ok(())
}
