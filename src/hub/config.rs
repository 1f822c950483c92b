//! Broadcast hub configuration

/// Hub configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Consecutive frames a subscriber may miss (sink still full) before it
    /// is treated as unreachable and dropped
    pub max_missed_frames: u32,

    /// Capacity of sinks created by `BroadcastHub::subscribe`
    ///
    /// 1 means only the in-flight frame is held; anything slower misses frames.
    pub sink_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_missed_frames: 60, // ~2s at 30 fps
            sink_capacity: 1,
        }
    }
}

impl HubConfig {
    /// Set the missed-frame limit (minimum 1)
    pub fn max_missed_frames(mut self, frames: u32) -> Self {
        self.max_missed_frames = frames.max(1);
        self
    }

    /// Set the channel capacity for hub-created sinks (minimum 1)
    pub fn sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity.max(1);
        self
    }
}
