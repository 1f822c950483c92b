//! Capture pipeline
//!
//! The [`PipelineController`] ties the pieces together:
//!
//! ```text
//! CaptureSource::open ──► FrameGrabber (owned by the capture thread)
//!                              │
//!          RateGovernor ──► grab ──► JpegEncoder ──► BroadcastHub::publish
//! ```
//!
//! Exactly one capture loop exists per controller while it is `Running`.

pub mod config;
pub mod controller;
pub mod state;
mod worker;

pub use config::PipelineConfig;
pub use controller::PipelineController;
pub use state::PipelineState;
