//! Broadcast hub implementation
//!
//! Owns the subscriber registry and fans each encoded frame out to every
//! registered sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::encode::EncodedPayload;
use crate::error::DeliveryError;

use super::config::HubConfig;
use super::entry::{Delivery, HubStats, PublishReport, SubscriberEntry, SubscriptionId};
use super::sink::FrameSink;

#[derive(Debug, Default)]
struct HubCounters {
    frames_published: AtomicU64,
    deliveries: AtomicU64,
    misses: AtomicU64,
    dropped_slow: AtomicU64,
    dropped_closed: AtomicU64,
}

/// Registry of subscribers with failure-isolated fan-out
///
/// `publish` holds the registry lock only long enough to snapshot the
/// subscriber list, so concurrent `register`/`unregister` calls never wait on
/// delivery and never see a half-iterated map.
pub struct BroadcastHub {
    subscribers: RwLock<HashMap<SubscriptionId, Arc<SubscriberEntry>>>,
    next_id: AtomicU64,
    counters: HubCounters,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a hub with default configuration
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration
    pub fn with_config(config: HubConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            counters: HubCounters::default(),
            config,
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a sink; it receives every frame published from now on
    pub fn register(&self, sink: impl FrameSink) -> SubscriptionId {
        self.register_boxed(Box::new(sink))
    }

    /// Register an already boxed sink
    pub fn register_boxed(&self, sink: Box<dyn FrameSink>) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(SubscriberEntry::new(sink));

        let count = {
            let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            subscribers.insert(id, entry);
            subscribers.len()
        };

        tracing::info!(subscription = %id, subscribers = count, "Subscriber added");
        id
    }

    /// Register a bounded channel sink and return its receiving half
    pub fn subscribe(&self) -> (SubscriptionId, mpsc::Receiver<EncodedPayload>) {
        let (tx, rx) = mpsc::channel(self.config.sink_capacity);
        (self.register(tx), rx)
    }

    /// Remove a subscriber
    ///
    /// Returns `false` if it was not registered (already removed, or dropped
    /// by the hub); that is not an error.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            let removed = subscribers.remove(&id);
            (removed, subscribers.len())
        };

        match removed {
            Some(entry) => {
                tracing::info!(
                    subscription = %id,
                    subscribers = count,
                    delivered = entry.delivered(),
                    connected_secs = entry.registered_at.elapsed().as_secs(),
                    "Subscriber removed"
                );
                true
            }
            None => {
                tracing::debug!(subscription = %id, "Unregister for unknown subscriber ignored");
                false
            }
        }
    }

    /// Whether `id` is currently registered
    pub fn is_registered(&self, id: SubscriptionId) -> bool {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Deliver a frame to every registered subscriber
    ///
    /// Each delivery is a non-blocking attempt. A subscriber that is still
    /// busy misses this frame; one that stays busy for `max_missed_frames`
    /// frames, or whose sink has closed, is unregistered. None of this can
    /// delay delivery to the other subscribers.
    pub fn publish(&self, payload: &EncodedPayload) -> PublishReport {
        let snapshot: Vec<(SubscriptionId, Arc<SubscriberEntry>)> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subscribers
                .iter()
                .map(|(id, entry)| (*id, Arc::clone(entry)))
                .collect()
        };

        self.counters.frames_published.fetch_add(1, Ordering::Relaxed);

        let mut report = PublishReport::default();
        let mut unreachable = Vec::new();

        for (id, entry) in snapshot {
            match entry.deliver(payload.clone(), self.config.max_missed_frames) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Missed => report.missed += 1,
                Delivery::Unreachable(reason) => unreachable.push((id, reason)),
            }
        }

        self.counters
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .misses
            .fetch_add(report.missed as u64, Ordering::Relaxed);

        if !unreachable.is_empty() {
            report.dropped = self.drop_unreachable(unreachable);
        }

        tracing::trace!(
            sequence = payload.sequence,
            bytes = payload.len(),
            delivered = report.delivered,
            missed = report.missed,
            dropped = report.dropped,
            "Frame published"
        );

        report
    }

    fn drop_unreachable(&self, unreachable: Vec<(SubscriptionId, DeliveryError)>) -> usize {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let mut dropped = 0;

        for (id, reason) in unreachable {
            // May already be gone if unregistered concurrently
            if subscribers.remove(&id).is_none() {
                continue;
            }
            dropped += 1;

            match reason {
                DeliveryError::Full => {
                    self.counters.dropped_slow.fetch_add(1, Ordering::Relaxed);
                }
                DeliveryError::Closed => {
                    self.counters.dropped_closed.fetch_add(1, Ordering::Relaxed);
                }
            }

            tracing::warn!(
                subscription = %id,
                reason = %reason,
                subscribers = subscribers.len(),
                "Subscriber dropped"
            );
        }

        dropped
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Get hub statistics
    pub fn stats(&self) -> HubStats {
        HubStats {
            subscriber_count: self.subscriber_count(),
            frames_published: self.counters.frames_published.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            dropped_slow: self.counters.dropped_slow.load(Ordering::Relaxed),
            dropped_closed: self.counters.dropped_closed.load(Ordering::Relaxed),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
