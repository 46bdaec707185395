//! Fuzz target for frame header boundary conditions
//!
//! # Strategy
//!
//! - Magic bytes: Valid, off-by-one, all-zeros, all-ones, random
//! - Payload size: Zero, small, at-max, just-over-max, way-over-max, u32::MAX
//! - Version: Valid (0x01), zero, max, random
//! - Session id: Boundary values (0, 1, MAX)
//!
//! # Invariants
//!
//! - `payload_size > MAX_PAYLOAD_SIZE` (16MB) never decodes
//! - Invalid magic bytes never decode
//! - Encoded size equals 20 + payload length

#![no_main]

use arbitrary::Arbitrary;
use authnet_proto::{Frame, FrameHeader, Opcode};
use libfuzzer_sys::fuzz_target;

const MAGIC: [u8; 4] = FrameHeader::MAGIC.to_be_bytes();
const MAX_PAYLOAD_SIZE: u32 = FrameHeader::MAX_PAYLOAD_SIZE;

#[derive(Debug, Clone, Arbitrary)]
struct BoundaryFrame {
    magic: MagicBytes,
    version: VersionBytes,
    flags: u8,
    opcode: u16,
    payload_size: PayloadSize,
    session_id: SessionId,
}

#[derive(Debug, Clone, Arbitrary)]
enum MagicBytes {
    Valid,
    OffByOne(u8),
    AllZeros,
    AllOnes,
    Random([u8; 4]),
}

#[derive(Debug, Clone, Arbitrary)]
enum VersionBytes {
    Valid,
    Zero,
    Max,
    Random(u8),
}

#[derive(Debug, Clone, Arbitrary)]
enum PayloadSize {
    Zero,
    Small(u8),
    AtMaxBoundary,
    JustOverMax,
    WayOverMax,
    MaxU32,
    Random(u32),
}

#[derive(Debug, Clone, Arbitrary)]
enum SessionId {
    Zero,
    One,
    MaxU64,
    Random(u64),
}

fuzz_target!(|boundary: BoundaryFrame| {
    let payload_size_value = match boundary.payload_size {
        PayloadSize::Zero => 0,
        PayloadSize::Small(s) => u32::from(s),
        PayloadSize::AtMaxBoundary => MAX_PAYLOAD_SIZE,
        PayloadSize::JustOverMax => MAX_PAYLOAD_SIZE.saturating_add(1),
        PayloadSize::WayOverMax => MAX_PAYLOAD_SIZE.saturating_add(1_000_000),
        PayloadSize::MaxU32 => u32::MAX,
        PayloadSize::Random(r) => r,
    };

    let actual_payload_size = payload_size_value.min(100_000) as usize;
    let mut buffer = vec![0u8; FrameHeader::SIZE + actual_payload_size];

    match boundary.magic {
        MagicBytes::Valid => buffer[0..4].copy_from_slice(&MAGIC),
        MagicBytes::OffByOne(offset) => {
            buffer[0..4].copy_from_slice(&MAGIC);
            let idx = (offset % 4) as usize;
            buffer[idx] = buffer[idx].wrapping_add(1);
        },
        MagicBytes::AllZeros => buffer[0..4].fill(0),
        MagicBytes::AllOnes => buffer[0..4].fill(0xFF),
        MagicBytes::Random(bytes) => buffer[0..4].copy_from_slice(&bytes),
    }

    buffer[4] = match boundary.version {
        VersionBytes::Valid => FrameHeader::VERSION,
        VersionBytes::Zero => 0,
        VersionBytes::Max => u8::MAX,
        VersionBytes::Random(v) => v,
    };
    buffer[5] = boundary.flags;
    buffer[6..8].copy_from_slice(&boundary.opcode.to_be_bytes());
    buffer[8..12].copy_from_slice(&payload_size_value.to_be_bytes());

    let session_id = match boundary.session_id {
        SessionId::Zero => 0,
        SessionId::One => 1,
        SessionId::MaxU64 => u64::MAX,
        SessionId::Random(r) => r,
    };
    buffer[12..20].copy_from_slice(&session_id.to_be_bytes());

    if let Ok(frame) = Frame::decode(&buffer) {
        assert_eq!(buffer[0..4], MAGIC);
        assert!(payload_size_value <= MAX_PAYLOAD_SIZE);
        assert_eq!(frame.header.session_id(), session_id);
        assert_eq!(frame.header.opcode(), boundary.opcode);
    }

    if let Some(opcode) = Opcode::from_u16(boundary.opcode) {
        let header = FrameHeader::new(opcode).with_session_id(session_id);
        let frame = Frame::new(header, vec![0xAA; actual_payload_size.min(1000)]);

        let mut encoded = Vec::new();
        if frame.encode(&mut encoded).is_err() {
            return;
        }

        assert_eq!(encoded.len(), FrameHeader::SIZE + frame.payload.len());

        let decoded = Frame::decode(&encoded).expect("encoded frame must decode");
        assert_eq!(decoded, frame);
    }
});
