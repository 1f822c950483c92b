//! Live camera capture and broadcast pipeline
//!
//! Frames flow one way through a single capture loop:
//!
//! ```text
//! CaptureSource ──► RateGovernor ──► JpegEncoder ──► BroadcastHub ──► viewers
//!   (device)        (fixed cadence)   (quality 0-100)  (drop, never block)
//! ```
//!
//! [`PipelineController`] owns the lifecycle (`start`, `stop`, `subscribe`,
//! `unsubscribe`). [`StreamServer`] exposes the hub to WebSocket viewers as
//! `{"event":"frame","data":"<base64 JPEG>"}` text messages.
//!
//! # Example
//!
//! ```no_run
//! use framecast::capture::{CaptureConfig, SyntheticSource};
//! use framecast::PipelineController;
//!
//! let controller = PipelineController::new(
//!     SyntheticSource::new(),
//!     CaptureConfig::default().resolution(320, 240).target_fps(15),
//! );
//! let (_id, mut frames) = controller.subscribe_channel();
//! controller.start().unwrap();
//! let frame = frames.blocking_recv().unwrap();
//! println!("{} bytes", frame.len());
//! controller.stop().unwrap();
//! ```

pub mod capture;
pub mod encode;
pub mod error;
pub mod governor;
pub mod hub;
pub mod pipeline;
pub mod server;
pub mod stats;

pub use capture::{CaptureConfig, CaptureSource, FrameGrabber, RawFrame};
pub use encode::{EncodedPayload, JpegEncoder};
pub use error::{CaptureError, DeliveryError, EncodeError, Error, PipelineError, Result};
pub use governor::RateGovernor;
pub use hub::{BroadcastHub, FrameSink, HubConfig, SubscriptionId};
pub use pipeline::{PipelineConfig, PipelineController, PipelineState};
pub use server::{ServerConfig, StreamServer};
pub use stats::PipelineStats;
