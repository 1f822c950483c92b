//! Pipeline controller
//!
//! Owns the lifecycle of one camera: opens the device on `start`, runs exactly
//! one capture loop on a dedicated thread, and on `stop` waits for that loop
//! to exit before closing the device.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tokio::sync::{mpsc as async_mpsc, watch};

use crate::capture::{CaptureConfig, CaptureSource, FrameGrabber};
use crate::encode::{EncodedPayload, JpegEncoder};
use crate::error::{CaptureError, PipelineError};
use crate::governor::RateGovernor;
use crate::hub::{BroadcastHub, FrameSink, SubscriptionId};
use crate::stats::{PipelineCounters, PipelineStats};

use super::config::PipelineConfig;
use super::state::PipelineState;
use super::worker::CaptureWorker;

/// Handle to the running capture thread
struct RunningWorker {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<Box<dyn FrameGrabber>>,
}

struct Lifecycle {
    capture_config: CaptureConfig,
    worker: Option<RunningWorker>,
}

/// Lifecycle controller for a single capture device
///
/// All methods take `&self`, so the controller can be shared behind an `Arc`
/// with request handlers. `start` and `stop` are serialized internally;
/// `state`, `stats` and the subscription methods never wait on them.
pub struct PipelineController {
    source: Arc<dyn CaptureSource>,
    hub: Arc<BroadcastHub>,
    config: PipelineConfig,
    lifecycle: Mutex<Lifecycle>,
    state: Arc<watch::Sender<PipelineState>>,
    last_error: Arc<Mutex<Option<CaptureError>>>,
    counters: Arc<PipelineCounters>,
}

impl PipelineController {
    /// Create a controller with default pipeline settings and its own hub
    pub fn new(source: impl CaptureSource, capture_config: CaptureConfig) -> Self {
        Self::with_config(
            Arc::new(source),
            capture_config,
            PipelineConfig::default(),
            Arc::new(BroadcastHub::new()),
        )
    }

    /// Create a controller with explicit pipeline settings and hub
    pub fn with_config(
        source: Arc<dyn CaptureSource>,
        capture_config: CaptureConfig,
        config: PipelineConfig,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);

        Self {
            source,
            hub,
            config,
            lifecycle: Mutex::new(Lifecycle {
                capture_config,
                worker: None,
            }),
            state: Arc::new(state),
            last_error: Arc::new(Mutex::new(None)),
            counters: Arc::new(PipelineCounters::new()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start capturing with the current configuration
    ///
    /// Fails with `Conflict` (changing nothing) if already running or
    /// stopping. From `Stopped` or `Failed` the controller first resets to
    /// `Idle`. If the device cannot be opened the state stays `Idle`.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut lifecycle = self.lifecycle();
        self.start_locked(&mut lifecycle)
    }

    /// Replace the capture configuration, then start
    pub fn start_with(&self, capture_config: CaptureConfig) -> Result<(), PipelineError> {
        let mut lifecycle = self.lifecycle();
        self.state().check_start()?;
        lifecycle.capture_config = capture_config;
        self.start_locked(&mut lifecycle)
    }

    fn start_locked(&self, lifecycle: &mut Lifecycle) -> Result<(), PipelineError> {
        let state = self.state();
        state.check_start()?;

        if state != PipelineState::Idle {
            // Reap the previous loop if it ended on its own
            Self::reap(lifecycle.worker.take());
            self.state.send_replace(PipelineState::Idle);
            tracing::debug!(previous = %state, "Pipeline reset to idle");
        }

        let capture_config = lifecycle.capture_config.clone();
        let grabber = match self.source.open(&capture_config) {
            Ok(grabber) => grabber,
            Err(e) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    device = %capture_config.device,
                    error = %e,
                    "Failed to open capture device"
                );
                self.set_last_error(Some(e.clone()));
                return Err(PipelineError::Capture(e));
            }
        };

        self.set_last_error(None);
        self.counters.reset();

        let (stop_tx, stop_rx) = mpsc::channel();
        let worker = CaptureWorker {
            grabber,
            encoder: JpegEncoder::new(capture_config.quality),
            governor: RateGovernor::new(capture_config.target_fps),
            hub: Arc::clone(&self.hub),
            config: self.config.clone(),
            target_fps: capture_config.target_fps,
            counters: Arc::clone(&self.counters),
            state: Arc::clone(&self.state),
            last_error: Arc::clone(&self.last_error),
            stop_rx,
        };

        // Running must be visible before the loop can report Failed
        self.state.send_replace(PipelineState::Running);

        let thread = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| {
                // The closure, and the device handle inside it, were dropped
                self.state.send_replace(PipelineState::Idle);
                PipelineError::Spawn(e.to_string())
            })?;

        lifecycle.worker = Some(RunningWorker { stop_tx, thread });

        tracing::info!(
            device = %capture_config.device,
            width = capture_config.width,
            height = capture_config.height,
            fps = capture_config.target_fps,
            quality = capture_config.quality,
            "Pipeline started"
        );
        Ok(())
    }

    /// Stop capturing and release the device
    ///
    /// Signals the loop, waits for it to exit (at most one frame interval
    /// plus one grab timeout), closes the device and moves to `Stopped`.
    /// Works from `Running` and from `Failed`. Blocks the calling thread;
    /// from async code call it via `spawn_blocking`.
    ///
    /// The lifecycle lock is released while the loop is joined, so a
    /// concurrent `start` or `stop` sees `Stopping` and gets a `Conflict`
    /// instead of waiting.
    pub fn stop(&self) -> Result<(), PipelineError> {
        let (from, worker) = {
            let mut lifecycle = self.lifecycle();
            let state = self.state();
            state.check_stop()?;

            self.state.send_replace(PipelineState::Stopping);
            (state, lifecycle.worker.take())
        };

        Self::reap(worker);
        self.state.send_replace(PipelineState::Stopped);

        tracing::info!(from = %from, "Pipeline stopped");
        Ok(())
    }

    /// Signal, join and close a capture loop
    fn reap(worker: Option<RunningWorker>) {
        let Some(worker) = worker else {
            return;
        };

        // Err means the loop already exited and dropped its receiver
        let _ = worker.stop_tx.send(());

        match worker.thread.join() {
            Ok(mut grabber) => grabber.close(),
            Err(_) => {
                // The handle was dropped (and closed) while unwinding
                tracing::error!("Capture loop panicked");
            }
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Watch lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Whether the capture loop is running
    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Error behind the last failed start or `Failed` transition
    pub fn last_error(&self) -> Option<CaptureError> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_last_error(&self, error: Option<CaptureError>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    /// Counters for the current (or last) run
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Capture configuration used by the next or current run
    pub fn capture_config(&self) -> CaptureConfig {
        self.lifecycle().capture_config.clone()
    }

    /// The hub frames are published to
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Register a sink with the hub
    pub fn subscribe(&self, sink: impl FrameSink) -> SubscriptionId {
        self.hub.register(sink)
    }

    /// Register a bounded channel with the hub
    pub fn subscribe_channel(&self) -> (SubscriptionId, async_mpsc::Receiver<EncodedPayload>) {
        self.hub.subscribe()
    }

    /// Remove a subscriber; a second call with the same id is a no-op
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.hub.unregister(id);
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        let worker = self
            .lifecycle
            .get_mut()
            .map(|l| l.worker.take())
            .unwrap_or_else(|e| e.into_inner().worker.take());

        if worker.is_some() {
            Self::reap(worker);
            self.state.send_replace(PipelineState::Stopped);
            tracing::info!("Pipeline stopped on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::capture::SyntheticSource;

    fn config() -> CaptureConfig {
        CaptureConfig::with_device("synthetic://unit")
            .resolution(16, 16)
            .target_fps(100)
    }

    fn controller(source: SyntheticSource) -> (PipelineController, Arc<SyntheticSource>) {
        let source = Arc::new(source);
        let controller = PipelineController::with_config(
            Arc::clone(&source) as Arc<dyn CaptureSource>,
            config(),
            PipelineConfig::default().retry_backoff(Duration::from_millis(1)),
            Arc::new(BroadcastHub::new()),
        );
        (controller, source)
    }

    fn wait_for_state(controller: &PipelineController, state: PipelineState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while controller.state() != state {
            assert!(Instant::now() < deadline, "timed out waiting for {}", state);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_start_stop() {
        let (controller, source) = controller(SyntheticSource::new());
        assert_eq!(controller.state(), PipelineState::Idle);

        controller.start().unwrap();
        assert_eq!(controller.state(), PipelineState::Running);
        assert!(source.stats().in_use);

        controller.stop().unwrap();
        assert_eq!(controller.state(), PipelineState::Stopped);
        assert!(!source.stats().in_use);
    }

    #[test]
    fn test_double_start_conflict() {
        let (controller, source) = controller(SyntheticSource::new());
        controller.start().unwrap();

        assert!(matches!(
            controller.start(),
            Err(PipelineError::Conflict(_))
        ));
        assert_eq!(controller.state(), PipelineState::Running);
        assert_eq!(source.stats().opens, 1);

        controller.stop().unwrap();
    }

    #[test]
    fn test_stop_when_idle_conflict() {
        let (controller, _source) = controller(SyntheticSource::new());

        assert!(matches!(controller.stop(), Err(PipelineError::Conflict(_))));
        assert_eq!(controller.state(), PipelineState::Idle);
    }

    #[test]
    fn test_unavailable_device_stays_idle() {
        let (controller, _source) = controller(SyntheticSource::new().unavailable());

        let result = controller.start();
        assert!(matches!(
            result,
            Err(PipelineError::Capture(CaptureError::DeviceUnavailable(_)))
        ));
        assert_eq!(controller.state(), PipelineState::Idle);
        assert!(matches!(
            controller.last_error(),
            Some(CaptureError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (controller, _source) = controller(SyntheticSource::new());

        let result = controller.start_with(config().target_fps(0));
        assert!(matches!(
            result,
            Err(PipelineError::Capture(CaptureError::InvalidConfig(_)))
        ));
        assert_eq!(controller.state(), PipelineState::Idle);
    }

    #[test]
    fn test_restart_after_stop() {
        let (controller, source) = controller(SyntheticSource::new());

        controller.start().unwrap();
        controller.stop().unwrap();
        controller.start().unwrap();
        assert_eq!(controller.state(), PipelineState::Running);
        controller.stop().unwrap();

        let stats = source.stats();
        assert_eq!(stats.opens, 2);
        assert_eq!(stats.closes, 2);
    }

    #[test]
    fn test_failure_then_stop() {
        let timeout = CaptureError::CaptureTimeout(Duration::from_millis(1));
        let (controller, source) =
            controller(SyntheticSource::new().then_fail(timeout, 5));

        controller.start().unwrap();
        wait_for_state(&controller, PipelineState::Failed);
        assert!(matches!(
            controller.last_error(),
            Some(CaptureError::DeviceDisconnected(_))
        ));

        controller.stop().unwrap();
        assert_eq!(controller.state(), PipelineState::Stopped);
        assert!(!source.stats().in_use);
    }

    #[test]
    fn test_restart_from_failed() {
        let disconnected = CaptureError::DeviceDisconnected("unplugged".into());
        let (controller, source) =
            controller(SyntheticSource::new().then_fail(disconnected, 5));

        controller.start().unwrap();
        wait_for_state(&controller, PipelineState::Failed);

        // Script exhausted; the device works again
        controller.start().unwrap();
        assert_eq!(controller.state(), PipelineState::Running);
        assert!(controller.last_error().is_none());
        controller.stop().unwrap();

        assert_eq!(source.stats().opens, 2);
        assert!(!source.stats().in_use);
    }

    #[test]
    fn test_transient_failures_recovered() {
        let timeout = CaptureError::CaptureTimeout(Duration::from_millis(1));
        let (controller, _source) =
            controller(SyntheticSource::new().then_fail(timeout, 4));
        let (_id, mut rx) = controller.subscribe_channel();

        controller.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let payload = loop {
            if let Ok(payload) = rx.try_recv() {
                break payload;
            }
            assert!(Instant::now() < deadline, "no frame after transient failures");
            std::thread::sleep(Duration::from_millis(2));
        };

        assert_eq!(payload.sequence, 1);
        assert_eq!(controller.state(), PipelineState::Running);
        assert_eq!(controller.stats().capture_errors, 4);
        controller.stop().unwrap();
    }

    #[test]
    fn test_start_while_stopping_conflicts() {
        // Each grab blocks long enough for stop to be caught mid-join
        let (controller, source) =
            controller(SyntheticSource::new().frame_delay(Duration::from_millis(400)));
        let controller = Arc::new(controller);
        controller.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let stopper = Arc::clone(&controller);
        let stop_thread = std::thread::spawn(move || stopper.stop());
        wait_for_state(&controller, PipelineState::Stopping);

        let attempted = Instant::now();
        assert!(matches!(controller.start(), Err(PipelineError::Conflict(_))));
        assert!(matches!(controller.stop(), Err(PipelineError::Conflict(_))));
        assert!(attempted.elapsed() < Duration::from_millis(100));

        stop_thread.join().unwrap().unwrap();
        assert_eq!(controller.state(), PipelineState::Stopped);
        assert_eq!(source.stats().opens, 1);
        assert!(!source.stats().in_use);
    }

    #[test]
    fn test_drop_releases_device() {
        let (controller, source) = controller(SyntheticSource::new());
        controller.start().unwrap();

        drop(controller);
        assert!(!source.stats().in_use);
    }

    #[test]
    fn test_watch_state() {
        let (controller, _source) = controller(SyntheticSource::new());
        let rx = controller.watch_state();

        controller.start().unwrap();
        assert_eq!(*rx.borrow(), PipelineState::Running);
        controller.stop().unwrap();
        assert_eq!(*rx.borrow(), PipelineState::Stopped);
    }
}
