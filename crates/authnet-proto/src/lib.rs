//! authnet wire protocol.
//!
//! Every message on the wire is a [`Frame`]: a fixed 20-byte binary
//! [`FrameHeader`] followed by a CBOR-encoded [`Payload`] whose type is named
//! by the header's [`Opcode`].
//!
//! ```text
//! ┌────────────── FrameHeader (20 bytes, big endian) ──────────────┐
//! │ magic "ANET" │ version │ flags │ opcode │ payload_size │ session │
//! └────────────────────────────────────────────────────────────────┘
//! ┌──────────── payload (payload_size bytes, CBOR) ────────────────┐
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This crate performs structural validation only. Authentication and
//! decryption happen in `authnet-core`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::{ErrorPayload, Payload};

/// Operation codes identifying the payload carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client opens the handshake
    Hello = 0x0001,
    /// Server answers Hello with its nonce and proof
    Challenge = 0x0002,
    /// Client proves knowledge of the HMAC key
    Response = 0x0003,
    /// Server confirms the session
    Accept = 0x0004,
    /// Keepalive request
    Ping = 0x0010,
    /// Keepalive reply
    Pong = 0x0011,
    /// Graceful disconnect
    Goodbye = 0x0012,
    /// Error report, followed by disconnect
    Error = 0x00FF,
    /// Encrypted application data
    Data = 0x0100,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::Challenge),
            0x0003 => Some(Self::Response),
            0x0004 => Some(Self::Accept),
            0x0010 => Some(Self::Ping),
            0x0011 => Some(Self::Pong),
            0x0012 => Some(Self::Goodbye),
            0x00FF => Some(Self::Error),
            0x0100 => Some(Self::Data),
            _ => None,
        }
    }

    /// Whether this opcode belongs to the handshake.
    #[must_use]
    pub const fn is_handshake(self) -> bool {
        matches!(self, Self::Hello | Self::Challenge | Self::Response | Self::Accept)
    }
}

/// Frame processing flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Payload is a `SecureMessage`.
    pub const ENCRYPTED: Self = Self(0b0000_0001);

    /// Decode from the header byte. Unknown bits are preserved.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Encode to the header byte.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}
