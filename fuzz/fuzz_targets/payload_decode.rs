//! Fuzz target for Payload::from_frame
//!
//! Feeds arbitrary CBOR under every opcode to catch:
//! - Malformed CBOR data
//! - Type confusion (wrong payload type for opcode)
//! - Oversized strings or collections
//!
//! Decoding must return an error, never panic.

#![no_main]

use authnet_proto::{Frame, FrameHeader, Opcode, Payload};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let opcodes = [
        Opcode::Hello,
        Opcode::Challenge,
        Opcode::Response,
        Opcode::Accept,
        Opcode::Ping,
        Opcode::Pong,
        Opcode::Goodbye,
        Opcode::Error,
        Opcode::Data,
    ];

    for opcode in opcodes {
        let frame = Frame::new(FrameHeader::new(opcode).with_session_id(1), Bytes::copy_from_slice(data));

        if let Ok(payload) = Payload::from_frame(&frame) {
            assert_eq!(payload.opcode(), opcode);
        }
    }
});
