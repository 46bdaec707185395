//! Fuzz target for Frame::decode
//!
//! Arbitrary byte sequences must never panic the frame parser. Looks for:
//! - Integer overflows in size calculations
//! - Buffer over-reads
//! - Malformed headers that bypass validation

#![no_main]

use authnet_proto::{Frame, FrameHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        assert!(frame.payload.len() <= FrameHeader::MAX_PAYLOAD_SIZE as usize);
        assert_eq!(frame.header.payload_size() as usize, frame.payload.len());
    }
});
