//! Subscriber entry and statistics types

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use crate::encode::EncodedPayload;
use crate::error::DeliveryError;

use super::sink::FrameSink;

/// Opaque subscriber identity handed out by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(super) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Delivery {
    Delivered,
    Missed,
    Unreachable(DeliveryError),
}

/// Registry entry for a single subscriber
pub(super) struct SubscriberEntry {
    sink: Box<dyn FrameSink>,
    /// Consecutive frames the sink had no room for
    missed: AtomicU32,
    delivered: AtomicU64,
    pub(super) registered_at: Instant,
}

impl SubscriberEntry {
    pub(super) fn new(sink: Box<dyn FrameSink>) -> Self {
        Self {
            sink,
            missed: AtomicU32::new(0),
            delivered: AtomicU64::new(0),
            registered_at: Instant::now(),
        }
    }

    /// Try to hand the payload to the sink
    ///
    /// A full sink counts as a miss until `max_missed` consecutive misses,
    /// after which the subscriber is reported unreachable.
    pub(super) fn deliver(&self, payload: EncodedPayload, max_missed: u32) -> Delivery {
        match self.sink.try_deliver(payload) {
            Ok(()) => {
                self.missed.store(0, Ordering::Relaxed);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Delivery::Delivered
            }
            Err(DeliveryError::Full) => {
                let missed = self.missed.fetch_add(1, Ordering::Relaxed) + 1;
                if missed >= max_missed {
                    Delivery::Unreachable(DeliveryError::Full)
                } else {
                    Delivery::Missed
                }
            }
            Err(DeliveryError::Closed) => Delivery::Unreachable(DeliveryError::Closed),
        }
    }

    pub(super) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Result of a single `publish` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the frame
    pub delivered: usize,
    /// Subscribers that were still busy and skipped this frame
    pub missed: usize,
    /// Subscribers dropped as unreachable during this publish
    pub dropped: usize,
}

/// Hub-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Currently registered subscribers
    pub subscriber_count: usize,
    /// Frames passed to `publish`
    pub frames_published: u64,
    /// Successful per-subscriber deliveries
    pub deliveries: u64,
    /// Per-subscriber skipped frames
    pub misses: u64,
    /// Subscribers dropped for falling too far behind
    pub dropped_slow: u64,
    /// Subscribers dropped because their sink closed
    pub dropped_closed: u64,
}
