//! Runtime configuration and key loading.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use authnet_core::AuthConfig;
use authnet_crypto::SharedKeys;

use crate::error::NetError;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7000";

/// Default connection limit for [`crate::Server::run`].
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:7000")
    pub bind_address: String,
    /// Maximum concurrent connections (handshaking or established)
    pub max_connections: usize,
    /// Session timeouts and heartbeats
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            auth: AuthConfig::default(),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address (e.g., "127.0.0.1:7000")
    pub server_address: String,
    /// Time allowed for the TCP connect
    pub connect_timeout: Duration,
    /// Session timeouts, heartbeats and client id
    pub auth: AuthConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:7000".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auth: AuthConfig::default(),
        }
    }
}

/// Where the pre-shared keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Key file with the encryption key and HMAC key on separate hex lines
    File(PathBuf),
    /// Hex strings given directly (flags or environment)
    Hex {
        /// Encryption key
        key: String,
        /// HMAC key
        hmac_key: String,
    },
}

impl KeySource {
    /// Pick a source from optional CLI inputs. A key file wins over hex keys.
    ///
    /// # Errors
    ///
    /// - `NetError::Config` if neither a file nor both hex keys are given
    pub fn from_options(
        key_file: Option<PathBuf>,
        key: Option<String>,
        hmac_key: Option<String>,
    ) -> Result<Self, NetError> {
        match (key_file, key, hmac_key) {
            (Some(path), _, _) => Ok(Self::File(path)),
            (None, Some(key), Some(hmac_key)) => Ok(Self::Hex { key, hmac_key }),
            (None, Some(_), None) => Err(NetError::Config("missing HMAC key".to_string())),
            (None, None, Some(_)) => Err(NetError::Config("missing encryption key".to_string())),
            (None, None, None) => Err(NetError::Config(
                "no keys given: pass --key-file or --key and --hmac-key".to_string(),
            )),
        }
    }

    /// Load and validate the keys.
    ///
    /// # Errors
    ///
    /// - `NetError::Config` if the key file cannot be read
    /// - `NetError::Crypto` if a key is malformed
    pub fn load(&self) -> Result<SharedKeys, NetError> {
        match self {
            Self::File(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    NetError::Config(format!("failed to read key file {}: {e}", path.display()))
                })?;
                Ok(SharedKeys::parse_key_file(&contents)?)
            },
            Self::Hex { key, hmac_key } => Ok(SharedKeys::from_hex(key, hmac_key)?),
        }
    }
}

/// Write `keys` to `path` in key-file format.
///
/// On Unix the file ends up readable by the owner only, including when an
/// existing file with wider permissions is overwritten.
///
/// # Errors
///
/// - `NetError::Config` if the file cannot be written
pub fn write_key_file(path: &Path, keys: &SharedKeys) -> Result<(), NetError> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|e| NetError::Config(format!("failed to create {}: {e}", path.display())))?;

    // `mode` only applies on creation; tighten before any secret is written
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).map_err(|e| {
            NetError::Config(format!("failed to restrict {}: {e}", path.display()))
        })?;
    }
    file.write_all(keys.to_key_file().as_bytes())
        .map_err(|e| NetError::Config(format!("failed to write {}: {e}", path.display())))?;

    Ok(())
}
