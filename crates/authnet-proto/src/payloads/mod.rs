//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, payloads use CBOR for type safety and
//! forward compatibility. The `Payload` enum covers every message type:
//! handshake, session management, and encrypted application data.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness). Round-trip encoding must produce identical values, and
//! decoding accepts only the exact bytes `encode` would produce, so every
//! payload has a single wire form.

pub mod session;

use authnet_crypto::SecureMessage;
use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    Frame, FrameFlags, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads
///
/// The payload type is determined by the `Opcode` in the frame header,
/// so we serialize only the inner struct content (no variant tag in CBOR).
///
/// # Security
///
/// - No Variant Tag: The frame header's `opcode` field already identifies the
///   payload type. Mismatched opcode/payload pairs fail to decode.
///
/// - Exhaustive Matching: Adding a new variant causes compile errors in
///   `encode()`, `decode()`, and `opcode()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Handshake
    /// Client opens the handshake
    Hello(session::Hello),
    /// Server nonce, session id and proof
    Challenge(session::Challenge),
    /// Client proof
    Response(session::Response),
    /// Server confirms the session
    Accept,

    // Session Management
    /// Ping for keepalive
    Ping,
    /// Pong response
    Pong,
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Error report
    Error(ErrorPayload),

    // Application Data
    /// Encrypted and authenticated application message
    Data(SecureMessage),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Handshake proof did not verify.
    pub const AUTH_FAILED: u16 = 0x0001;
    /// Frame not valid in the current state, or malformed.
    pub const PROTOCOL_VIOLATION: u16 = 0x0002;
    /// Hello carried an unsupported version.
    pub const UNSUPPORTED_VERSION: u16 = 0x0003;
    /// Data frame failed its integrity checks (tag, decryption, sequence).
    pub const INTEGRITY_FAILURE: u16 = 0x0004;
    /// Handshake or idle timeout.
    pub const TIMEOUT: u16 = 0x0005;

    /// Create an authentication failure error.
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self { code: Self::AUTH_FAILED, message: msg.into() }
    }

    /// Create a protocol violation error.
    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self { code: Self::PROTOCOL_VIOLATION, message: msg.into() }
    }

    /// Create an unsupported version error.
    pub fn unsupported_version(version: u8) -> Self {
        Self {
            code: Self::UNSUPPORTED_VERSION,
            message: format!("unsupported protocol version: {version}"),
        }
    }

    /// Create an integrity failure error.
    pub fn integrity_failure(msg: impl Into<String>) -> Self {
        Self { code: Self::INTEGRITY_FAILURE, message: msg.into() }
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self { code: Self::TIMEOUT, message: msg.into() }
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::Challenge(_) => Opcode::Challenge,
            Self::Response(_) => Opcode::Response,
            Self::Accept => Opcode::Accept,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Error(_) => Opcode::Error,
            Self::Data(_) => Opcode::Data,
        }
    }

    /// Encode payload to buffer
    ///
    /// Serializes only the inner struct, NOT the variant tag.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Challenge(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Response(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Accept | Self::Ping | Self::Pong => Ok(()), // Zero-byte payloads
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Data(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    /// - `ProtocolError::NonCanonical` if the bytes decode but are not the
    ///   canonical encoding of the value (or carry trailing bytes)
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(from_cbor(bytes)?),
            Opcode::Challenge => Self::Challenge(from_cbor(bytes)?),
            Opcode::Response => Self::Response(from_cbor(bytes)?),
            Opcode::Accept => Self::Accept,
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::Goodbye => Self::Goodbye(from_cbor(bytes)?),
            Opcode::Error => Self::Error(from_cbor(bytes)?),
            Opcode::Data => Self::Data(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame
    ///
    /// - Encodes the payload to CBOR bytes
    /// - Sets the opcode (and the `ENCRYPTED` flag for Data) in the header
    /// - Creates a Frame with automatic `payload_size` calculation
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;

        header.set_opcode(self.opcode());
        if matches!(self, Self::Data(_)) {
            header.set_flags(header.flags().union(FrameFlags::ENCRYPTED));
        }

        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the opcode is not recognized
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn from_cbor<T>(bytes: &[u8]) -> Result<T>
where
    T: serde::de::DeserializeOwned + Serialize,
{
    let value: T =
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))?;

    let mut canonical = Vec::with_capacity(bytes.len());
    ciborium::ser::into_writer(&value, &mut canonical)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    if canonical != bytes {
        return Err(ProtocolError::NonCanonical);
    }

    Ok(value)
}
