//! Raw frame types
//!
//! A `RawFrame` lives for exactly one loop iteration: produced by `grab`,
//! consumed by the encoder, then dropped. No frame history is kept.

use std::time::{Duration, Instant};

/// Pixel layout of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit R, G, B
    Rgb24,
    /// Single 8-bit luma channel
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// In-memory pixel buffer plus capture timestamp
///
/// Deliberately not `Clone`: ownership moves from the grabber to the encoder.
#[derive(Debug)]
pub struct RawFrame {
    /// Pixel data, row-major, tightly packed
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Monotonic capture instant
    pub captured_at: Instant,
    /// Per-handle capture counter, starting at 1
    pub sequence: u64,
}

impl RawFrame {
    /// Create a new RGB24 frame captured now
    pub fn rgb(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            format: PixelFormat::Rgb24,
            captured_at: Instant::now(),
            sequence,
        }
    }

    /// Override the pixel format
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Expected buffer length for the frame dimensions
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.format.bytes_per_pixel())
    }

    /// Age of the frame
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}
