//! Pipeline statistics

pub mod metrics;

pub use metrics::{FpsMeter, PipelineCounters, PipelineStats};
