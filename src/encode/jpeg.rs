//! JPEG frame encoder
//!
//! Pure with respect to pipeline state: identical pixels at identical quality
//! always produce identical bytes, and independent frames may be encoded
//! concurrently.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
use image::ExtendedColorType;

use crate::capture::{PixelFormat, RawFrame};
use crate::error::EncodeError;

use super::payload::EncodedPayload;

/// Lowest quality the codec accepts; 0 maps here
const MIN_CODEC_QUALITY: u8 = 1;

/// Compress a frame at `quality` (0-100, clamped)
pub fn encode(frame: &RawFrame, quality: u8) -> Result<EncodedPayload, EncodeError> {
    if frame.width == 0 || frame.height == 0 || frame.data.is_empty() {
        return Err(EncodeError::EmptyFrame);
    }

    let expected = frame
        .expected_len()
        .ok_or_else(|| EncodeError::Codec("frame dimensions overflow".into()))?;
    if frame.data.len() != expected {
        return Err(EncodeError::BufferMismatch {
            expected,
            actual: frame.data.len(),
        });
    }

    let color = match frame.format {
        PixelFormat::Rgb24 => ExtendedColorType::Rgb8,
        PixelFormat::Gray8 => ExtendedColorType::L8,
    };

    let quality = quality.clamp(MIN_CODEC_QUALITY, 100);
    // JPEG rarely exceeds a quarter of the raw size at typical qualities
    let mut out = Vec::with_capacity(expected / 4);
    ImageJpegEncoder::new_with_quality(&mut out, quality)
        .encode(&frame.data, frame.width, frame.height, color)
        .map_err(|e| EncodeError::Codec(e.to_string()))?;

    Ok(EncodedPayload::new(
        Bytes::from(out),
        frame.captured_at,
        frame.sequence,
    ))
}

/// Encoder bound to a fixed quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedPayload, EncodeError> {
        encode(frame, self.quality)
    }
}
