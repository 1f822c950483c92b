//! Broadcast hub for frame fan-out
//!
//! The hub owns the subscriber registry and delivers each encoded frame to
//! every registered sink. It is independent of pipeline state: subscribers
//! may come and go whether or not the camera is running.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<BroadcastHub>
//!                     ┌─────────────────────────┐
//!                     │ subscribers: HashMap<   │
//!                     │   SubscriptionId,       │
//!                     │   SubscriberEntry {     │
//!                     │     sink,               │
//!                     │     missed,             │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │ snapshot
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Capture loop]          [Viewer]                [Viewer]
//!    hub.publish()           rx.recv()               rx.recv()
//!         │                       │                       │
//!         └──► try_deliver() ────►└──► WebSocket          └──► WebSocket
//! ```
//!
//! # Backpressure
//!
//! Deliveries never block. A sink holds at most the in-flight frame; while it
//! is full the subscriber misses frames (freshness over completeness). After
//! `max_missed_frames` consecutive misses, or as soon as a sink reports it is
//! closed, the subscriber is unregistered.
//!
//! Payload bytes are `bytes::Bytes`, so every subscriber shares one
//! allocation per frame.

pub mod config;
pub mod entry;
pub mod sink;
pub mod store;

pub use config::HubConfig;
pub use entry::{HubStats, PublishReport, SubscriptionId};
pub use sink::{FnSink, FrameSink};
pub use store::BroadcastHub;
