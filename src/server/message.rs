//! Wire messages sent to viewers
//!
//! Every emitted frame is one WebSocket text message:
//!
//! ```json
//! {"event":"frame","data":"<base64 JPEG>"}
//! ```
//!
//! Transport order matches capture order, so no sequence field is sent.

use serde::{Deserialize, Serialize};

use crate::encode::EncodedPayload;

/// Event name for frame messages
pub const FRAME_EVENT: &str = "frame";

/// A frame event as serialized on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEvent {
    /// Event name, always `frame`
    pub event: String,
    /// Base64-encoded JPEG
    pub data: String,
}

impl FrameEvent {
    /// Build the event for an encoded payload
    pub fn from_payload(payload: &EncodedPayload) -> Self {
        Self {
            event: FRAME_EVENT.to_string(),
            data: payload.to_base64(),
        }
    }

    /// Serialize to the JSON text sent over the socket
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
