//! Synthetic capture source
//!
//! Generates deterministic gradient frames without hardware. Used by tests and
//! by the binary when no camera backend is compiled in. Failures can be
//! scripted per grab, and the source enforces exclusive access like a real
//! device so handle leaks show up as `DeviceUnavailable` on the next open.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::CaptureError;

use super::config::CaptureConfig;
use super::frame::RawFrame;
use super::source::{CaptureSource, FrameGrabber};

/// Device path prefix selecting the synthetic backend
pub const SYNTHETIC_PREFIX: &str = "synthetic://";

/// Shared counters, readable while the handle is owned by the capture loop
#[derive(Debug, Default)]
struct SyntheticShared {
    in_use: AtomicBool,
    opens: AtomicU64,
    closes: AtomicU64,
    grabs: AtomicU64,
    stale_discarded: AtomicU64,
}

/// Snapshot of synthetic source counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticStats {
    pub opens: u64,
    pub closes: u64,
    pub grabs: u64,
    pub stale_discarded: u64,
    pub in_use: bool,
}

/// One scripted grab result
#[derive(Debug, Clone)]
enum Scripted {
    Frame,
    /// A frame whose pixel buffer is short one row
    Truncated,
    Fail(CaptureError),
}

/// Synthetic camera
pub struct SyntheticSource {
    available: bool,
    frame_delay: Duration,
    script: Arc<Mutex<VecDeque<Scripted>>>,
    fail_forever: Option<CaptureError>,
    shared: Arc<SyntheticShared>,
}

impl SyntheticSource {
    /// Create an always-available source that never fails
    pub fn new() -> Self {
        Self {
            available: true,
            frame_delay: Duration::ZERO,
            script: Arc::new(Mutex::new(VecDeque::new())),
            fail_forever: None,
            shared: Arc::new(SyntheticShared::default()),
        }
    }

    /// Every `open` fails with `DeviceUnavailable`
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Simulated device latency per grab
    pub fn frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Queue `count` successful grabs
    pub fn then_succeed(self, count: usize) -> Self {
        self.push_script(Scripted::Frame, count)
    }

    /// Queue `count` failing grabs
    pub fn then_fail(self, error: CaptureError, count: usize) -> Self {
        self.push_script(Scripted::Fail(error), count)
    }

    /// Queue `count` grabs that return a frame too short for its
    /// dimensions, which the encoder rejects
    pub fn then_truncated(self, count: usize) -> Self {
        self.push_script(Scripted::Truncated, count)
    }

    /// Once the script is exhausted, every grab fails with `error`
    pub fn then_fail_forever(mut self, error: CaptureError) -> Self {
        self.fail_forever = Some(error);
        self
    }

    fn push_script(self, outcome: Scripted, count: usize) -> Self {
        {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.extend(std::iter::repeat(outcome).take(count));
        }
        self
    }

    /// Current counters
    pub fn stats(&self) -> SyntheticStats {
        SyntheticStats {
            opens: self.shared.opens.load(Ordering::Relaxed),
            closes: self.shared.closes.load(Ordering::Relaxed),
            grabs: self.shared.grabs.load(Ordering::Relaxed),
            stale_discarded: self.shared.stale_discarded.load(Ordering::Relaxed),
            in_use: self.shared.in_use.load(Ordering::Acquire),
        }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for SyntheticSource {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameGrabber>, CaptureError> {
        config.validate()?;

        if !self.available {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is not present",
                config.device
            )));
        }
        if self
            .shared
            .in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is busy",
                config.device
            )));
        }

        self.shared.opens.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            device = %config.device,
            width = config.width,
            height = config.height,
            fps = config.target_fps,
            "Synthetic device opened"
        );

        Ok(Box::new(SyntheticGrabber {
            script: Arc::clone(&self.script),
            fail_forever: self.fail_forever.clone(),
            config: config.clone(),
            shared: Arc::clone(&self.shared),
            frame_delay: self.frame_delay,
            sequence: 0,
            last_grab: None,
            open: true,
        }))
    }

    fn describe(&self) -> String {
        "synthetic gradient source".to_string()
    }
}

struct SyntheticGrabber {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    fail_forever: Option<CaptureError>,
    config: CaptureConfig,
    shared: Arc<SyntheticShared>,
    frame_delay: Duration,
    sequence: u64,
    last_grab: Option<Instant>,
    open: bool,
}

impl SyntheticGrabber {
    /// Scripted outcome for this grab; the script is shared across handles
    fn next_outcome(&self) -> Scripted {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        match (script.pop_front(), &self.fail_forever) {
            (Some(outcome), _) => outcome,
            (None, Some(error)) => Scripted::Fail(error.clone()),
            (None, None) => Scripted::Frame,
        }
    }

    /// Frames the simulated device queued since the previous grab, capped by
    /// its buffer depth. All but the newest are stale.
    fn queued_since_last_grab(&self, now: Instant) -> u64 {
        let Some(last) = self.last_grab else {
            return 1;
        };
        let interval = self.config.frame_interval().as_nanos().max(1);
        let arrived = (now.duration_since(last).as_nanos() / interval) as u64;
        arrived.clamp(1, self.config.buffer_depth as u64)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let len = self.config.frame_len().unwrap_or(0);
        let shift = self.sequence as usize;

        let mut pixels = vec![0u8; len];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = i % width;
            let y = i / width;
            px[0] = ((x + shift) % 256) as u8;
            px[1] = ((y + shift) % 256) as u8;
            px[2] = ((x + y) % 256) as u8;
        }
        pixels
    }
}

impl FrameGrabber for SyntheticGrabber {
    fn grab(&mut self) -> Result<RawFrame, CaptureError> {
        if !self.open {
            return Err(CaptureError::DeviceDisconnected(
                "handle already closed".into(),
            ));
        }
        self.shared.grabs.fetch_add(1, Ordering::Relaxed);

        if !self.frame_delay.is_zero() {
            std::thread::sleep(self.frame_delay.min(self.config.grab_timeout));
        }
        let outcome = self.next_outcome();
        if let Scripted::Fail(error) = &outcome {
            return Err(error.clone());
        }
        if self.frame_delay > self.config.grab_timeout {
            return Err(CaptureError::CaptureTimeout(self.config.grab_timeout));
        }

        let now = Instant::now();
        let queued = self.queued_since_last_grab(now);
        if queued > 1 {
            self.shared
                .stale_discarded
                .fetch_add(queued - 1, Ordering::Relaxed);
        }
        self.sequence += queued;
        self.last_grab = Some(now);

        let mut pixels = self.generate_pixels();
        if matches!(outcome, Scripted::Truncated) {
            let row = self.config.width as usize * 3;
            pixels.truncate(pixels.len().saturating_sub(row));
        }

        Ok(RawFrame::rgb(
            pixels,
            self.config.width,
            self.config.height,
            self.sequence,
        ))
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.shared.closes.fetch_add(1, Ordering::Relaxed);
        self.shared.in_use.store(false, Ordering::Release);
        tracing::info!(device = %self.config.device, "Synthetic device closed");
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for SyntheticGrabber {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CaptureConfig {
        CaptureConfig::with_device("synthetic://test")
            .resolution(8, 4)
            .target_fps(1000)
    }

    #[test]
    fn test_produces_frames() {
        let source = SyntheticSource::new();
        let mut handle = source.open(&small_config()).unwrap();

        let frame = handle.grab().unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.data.len(), 8 * 4 * 3);
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn test_exclusive_open() {
        let source = SyntheticSource::new();
        let mut first = source.open(&small_config()).unwrap();

        assert!(matches!(
            source.open(&small_config()),
            Err(CaptureError::DeviceUnavailable(_))
        ));

        first.close();
        assert!(source.open(&small_config()).is_ok());
    }

    #[test]
    fn test_close_idempotent() {
        let source = SyntheticSource::new();
        let mut handle = source.open(&small_config()).unwrap();

        handle.close();
        handle.close();
        drop(handle);

        let stats = source.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.closes, 1);
        assert!(!stats.in_use);
    }

    #[test]
    fn test_drop_releases_device() {
        let source = SyntheticSource::new();
        let handle = source.open(&small_config()).unwrap();
        drop(handle);

        assert!(!source.stats().in_use);
    }

    #[test]
    fn test_unavailable() {
        let source = SyntheticSource::new().unavailable();

        assert!(matches!(
            source.open(&small_config()),
            Err(CaptureError::DeviceUnavailable(_))
        ));
        assert!(!source.stats().in_use);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let source = SyntheticSource::new();
        let config = small_config().target_fps(0);

        assert!(matches!(
            source.open(&config),
            Err(CaptureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_scripted_failures() {
        let timeout = CaptureError::CaptureTimeout(Duration::from_millis(10));
        let source = SyntheticSource::new()
            .then_succeed(1)
            .then_fail(timeout.clone(), 2);
        let mut handle = source.open(&small_config()).unwrap();

        assert!(handle.grab().is_ok());
        assert_eq!(handle.grab().unwrap_err(), timeout);
        assert_eq!(handle.grab().unwrap_err(), timeout);
        assert!(handle.grab().is_ok());
    }

    #[test]
    fn test_truncated_frame() {
        let source = SyntheticSource::new().then_truncated(1);
        let mut handle = source.open(&small_config()).unwrap();

        let short = handle.grab().unwrap();
        assert_eq!(short.data.len(), 8 * 3 * 3);
        assert_eq!(short.expected_len(), Some(8 * 4 * 3));

        let full = handle.grab().unwrap();
        assert_eq!(full.data.len(), 8 * 4 * 3);
        assert!(full.sequence > short.sequence);
    }

    #[test]
    fn test_stale_frames_discarded() {
        let config = small_config().target_fps(100).buffer_depth(4);
        let source = SyntheticSource::new();
        let mut handle = source.open(&config).unwrap();

        let first = handle.grab().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let second = handle.grab().unwrap();

        // ~10 frames arrived but the device only buffers 4
        assert_eq!(second.sequence - first.sequence, 4);
        assert_eq!(source.stats().stale_discarded, 3);
    }

    #[test]
    fn test_pixels_deterministic() {
        let a = SyntheticSource::new();
        let b = SyntheticSource::new();
        let mut ha = a.open(&small_config()).unwrap();
        let mut hb = b.open(&small_config()).unwrap();

        assert_eq!(ha.grab().unwrap().data, hb.grab().unwrap().data);
    }
}
