//! Encoded payload shared with subscribers

use std::time::Instant;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

/// Compressed frame ready for transport
///
/// Cheap to clone: `Bytes` is reference counted, so every subscriber shares
/// the same allocation for the duration of one fan-out.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    /// Compressed image bytes
    pub data: Bytes,
    /// Capture instant of the source frame
    pub captured_at: Instant,
    /// Capture sequence number of the source frame
    pub sequence: u64,
}

impl EncodedPayload {
    pub fn new(data: Bytes, captured_at: Instant, sequence: u64) -> Self {
        Self {
            data,
            captured_at,
            sequence,
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Standard base64 of the compressed bytes
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }
}
