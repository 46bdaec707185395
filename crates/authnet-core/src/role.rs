//! Which end of a connection a socket plays.

use std::{fmt, str::FromStr};

use crate::error::AuthError;

/// Connection role.
///
/// The server listens and answers the handshake; the client connects and
/// opens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accepting side
    Server,
    /// Connecting side
    Client,
}

/// The accepting role.
pub const SERVER: Role = Role::Server;

/// The connecting role.
pub const CLIENT: Role = Role::Client;

impl Role {
    /// The role on the other end of the connection.
    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Server => Self::Client,
            Self::Client => Self::Server,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            other => Err(AuthError::InvalidRole(other.to_string())),
        }
    }
}
