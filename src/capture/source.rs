//! Capture source traits
//!
//! A `CaptureSource` opens the device; the returned `FrameGrabber` is the
//! exclusive device handle owned by the capture loop while the pipeline runs.

use crate::error::CaptureError;

use super::config::CaptureConfig;
use super::frame::RawFrame;

/// Factory for device handles
///
/// One source per physical device. `open` must fail with
/// `DeviceUnavailable` while another handle to the same device is live.
pub trait CaptureSource: Send + Sync + 'static {
    /// Open and configure the device
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameGrabber>, CaptureError>;

    /// Human-readable device description for logs
    fn describe(&self) -> String;
}

/// Exclusive handle to an opened device
pub trait FrameGrabber: Send + 'static {
    /// Return the most recent frame
    ///
    /// Frames queued in the device buffer ahead of the newest one are
    /// discarded first, so the result is never more than one capture interval
    /// stale. Blocks for at most the configured grab timeout.
    fn grab(&mut self) -> Result<RawFrame, CaptureError>;

    /// Release the device. Idempotent.
    fn close(&mut self);

    /// Whether the handle still holds the device
    fn is_open(&self) -> bool;
}
