//! Statistics for the capture pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Snapshot of pipeline counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Frames returned by the capture device
    pub frames_captured: u64,
    /// Frames compressed successfully
    pub frames_encoded: u64,
    /// Frames handed to the broadcast hub
    pub frames_published: u64,
    /// Total compressed bytes produced
    pub bytes_encoded: u64,
    /// Failed grabs (all kinds)
    pub capture_errors: u64,
    /// Frames skipped because compression failed
    pub encode_errors: u64,
    /// Times the frame cadence was re-anchored after an overrun
    pub overruns: u64,
    /// Most recent measured frame rate
    pub current_fps: f64,
    /// Time since the capture loop started
    pub uptime: Duration,
}

impl PipelineStats {
    /// Average compressed frame size in bytes
    pub fn average_frame_size(&self) -> u64 {
        if self.frames_encoded > 0 {
            self.bytes_encoded / self.frames_encoded
        } else {
            0
        }
    }

    /// Output bitrate in bits per second over the whole run
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_encoded * 8) / secs
        } else {
            0
        }
    }
}

/// Live counters shared between the capture loop and status readers
#[derive(Debug, Default)]
pub struct PipelineCounters {
    frames_captured: AtomicU64,
    frames_encoded: AtomicU64,
    frames_published: AtomicU64,
    bytes_encoded: AtomicU64,
    capture_errors: AtomicU64,
    encode_errors: AtomicU64,
    overruns: AtomicU64,
    /// Frames per second scaled by 1000
    fps_millis: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters for a fresh run
    pub fn reset(&self) {
        for counter in [
            &self.frames_captured,
            &self.frames_encoded,
            &self.frames_published,
            &self.bytes_encoded,
            &self.capture_errors,
            &self.encode_errors,
            &self.overruns,
            &self.fps_millis,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    pub fn on_capture(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_capture_error(&self) {
        self.capture_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_encode(&self, bytes: usize) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
        self.bytes_encoded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn on_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_publish(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_overruns(&self, overruns: u64) {
        self.overruns.store(overruns, Ordering::Relaxed);
    }

    pub fn set_fps(&self, fps: f64) {
        self.fps_millis
            .store((fps * 1000.0).round() as u64, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot
    pub fn snapshot(&self) -> PipelineStats {
        let uptime = self
            .started_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map(|t| t.elapsed())
            .unwrap_or_default();

        PipelineStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            bytes_encoded: self.bytes_encoded.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            current_fps: self.fps_millis.load(Ordering::Relaxed) as f64 / 1000.0,
            uptime,
        }
    }
}

/// Measures the achieved frame rate over windows of `window` frames
#[derive(Debug)]
pub struct FpsMeter {
    window: u64,
    count: u64,
    window_start: Instant,
}

impl FpsMeter {
    /// Report once every `window` frames (minimum 1)
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1) as u64,
            count: 0,
            window_start: Instant::now(),
        }
    }

    /// Count one frame at `now`; returns the window's rate when it closes
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        if self.count < self.window {
            return None;
        }

        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        };
        self.count = 0;
        self.window_start = now;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = PipelineCounters::new();
        counters.reset();

        counters.on_capture();
        counters.on_capture();
        counters.on_encode(1000);
        counters.on_encode_error();
        counters.on_publish();
        counters.on_capture_error();
        counters.set_fps(29.97);

        let stats = counters.snapshot();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.frames_encoded, 1);
        assert_eq!(stats.bytes_encoded, 1000);
        assert_eq!(stats.encode_errors, 1);
        assert_eq!(stats.frames_published, 1);
        assert_eq!(stats.capture_errors, 1);
        assert!((stats.current_fps - 29.97).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_counters() {
        let counters = PipelineCounters::new();
        counters.on_capture();
        counters.reset();

        assert_eq!(counters.snapshot().frames_captured, 0);
    }

    #[test]
    fn test_stats_derived_values() {
        let stats = PipelineStats {
            frames_encoded: 10,
            bytes_encoded: 1_000_000,
            uptime: Duration::from_secs(10),
            ..Default::default()
        };

        assert_eq!(stats.average_frame_size(), 100_000);
        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(stats.bitrate(), 800_000);
    }

    #[test]
    fn test_stats_zero_duration() {
        let stats = PipelineStats::default();

        assert_eq!(stats.average_frame_size(), 0);
        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_fps_meter_window() {
        let start = Instant::now();
        let mut meter = FpsMeter {
            window: 10,
            count: 0,
            window_start: start,
        };

        for i in 1..10u64 {
            assert!(meter.tick(start + Duration::from_millis(i * 100)).is_none());
        }
        let fps = meter.tick(start + Duration::from_secs(1)).unwrap();
        assert!((fps - 10.0).abs() < 1e-9);
    }
}
