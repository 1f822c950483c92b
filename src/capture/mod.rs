//! Camera capture
//!
//! A [`CaptureSource`] opens the device and hands back a [`FrameGrabber`],
//! the exclusive handle the capture loop pulls frames from.
//!
//! Backends:
//! - [`SyntheticSource`]: deterministic gradient frames, scripted failures
//! - `V4l2Source`: local V4L2 devices (feature: `v4l2`)

pub mod config;
pub mod frame;
pub(crate) mod queue;
pub mod source;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use config::CaptureConfig;
pub use frame::{PixelFormat, RawFrame};
pub use source::{CaptureSource, FrameGrabber};
pub use synthetic::{SyntheticSource, SyntheticStats, SYNTHETIC_PREFIX};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Source;
