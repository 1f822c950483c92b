//! Frame compression
//!
//! Turns a [`RawFrame`](crate::capture::RawFrame) into an [`EncodedPayload`]:
//! one still JPEG per frame, motion-JPEG style.

pub mod jpeg;
pub mod payload;

pub use jpeg::{encode, JpegEncoder};
pub use payload::EncodedPayload;
