//! WebSocket viewer server
//!
//! Each accepted connection is upgraded to a WebSocket and registered with
//! the broadcast hub as an ordinary subscriber:
//!
//! ```text
//!                     ┌──────────────────┐
//!   publish() ──────► │   BroadcastHub   │
//!                     └────────┬─────────┘
//!                 ┌────────────┼────────────┐
//!                 ▼            ▼            ▼
//!            [mpsc(1)]    [mpsc(1)]    [mpsc(1)]
//!                 │            │            │
//!           ViewerConnection tasks (JSON text frames)
//! ```
//!
//! A viewer that cannot keep up misses frames; it never slows the pipeline.

pub mod config;
pub mod connection;
pub mod listener;
pub mod message;

pub use config::ServerConfig;
pub use connection::ViewerConnection;
pub use listener::StreamServer;
pub use message::{FrameEvent, FRAME_EVENT};
