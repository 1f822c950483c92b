//! Capture loop
//!
//! Runs on its own thread and is the only code that touches the device handle
//! while the pipeline is running. Each iteration: wait for the governor
//! deadline, grab, encode, publish. The stop signal is checked once per
//! iteration and also ends any idle wait early.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::capture::FrameGrabber;
use crate::encode::JpegEncoder;
use crate::error::CaptureError;
use crate::governor::RateGovernor;
use crate::hub::BroadcastHub;
use crate::stats::{FpsMeter, PipelineCounters};

use super::config::PipelineConfig;
use super::state::PipelineState;

/// Why the loop returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ExitReason {
    Stopped,
    Failed(CaptureError),
}

/// State handed to the capture thread
pub(super) struct CaptureWorker {
    pub(super) grabber: Box<dyn FrameGrabber>,
    pub(super) encoder: JpegEncoder,
    pub(super) governor: RateGovernor,
    pub(super) hub: Arc<BroadcastHub>,
    pub(super) config: PipelineConfig,
    pub(super) target_fps: u32,
    pub(super) counters: Arc<PipelineCounters>,
    pub(super) state: Arc<watch::Sender<PipelineState>>,
    pub(super) last_error: Arc<Mutex<Option<CaptureError>>>,
    pub(super) stop_rx: Receiver<()>,
}

impl CaptureWorker {
    /// Run until stopped or failed; returns the device handle still open
    pub(super) fn run(mut self) -> Box<dyn FrameGrabber> {
        let reason = self.run_loop();

        match reason {
            ExitReason::Stopped => {
                tracing::info!(
                    frames = self.counters.snapshot().frames_published,
                    "Capture loop stopped"
                );
            }
            ExitReason::Failed(error) => {
                tracing::error!(error = %error, "Capture loop failed");
                *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
                self.state.send_if_modified(|state| {
                    if *state == PipelineState::Running {
                        *state = PipelineState::Failed;
                        true
                    } else {
                        false
                    }
                });
            }
        }

        self.grabber
    }

    fn run_loop(&mut self) -> ExitReason {
        let mut consecutive_failures = 0u32;
        let mut fps_meter = FpsMeter::new(self.target_fps);

        loop {
            if self.stop_requested() {
                return ExitReason::Stopped;
            }

            if let Some(wait) = self.governor.remaining(Instant::now()) {
                if self.wait_for_stop(wait) {
                    return ExitReason::Stopped;
                }
            }

            match self.grabber.grab() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    self.counters.on_capture();

                    match self.encoder.encode(&frame) {
                        Ok(payload) => {
                            self.counters.on_encode(payload.len());
                            self.hub.publish(&payload);
                            self.counters.on_publish();

                            if let Some(fps) = fps_meter.tick(Instant::now()) {
                                tracing::debug!(
                                    fps = (fps * 10.0).round() / 10.0,
                                    target = self.target_fps,
                                    "Streaming at measured rate"
                                );
                                self.counters.set_fps(fps);
                            }
                        }
                        Err(e) => {
                            self.counters.on_encode_error();
                            tracing::warn!(
                                sequence = frame.sequence,
                                error = %e,
                                "Frame encode failed, skipping"
                            );
                        }
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.counters.on_capture_error();

                    if e.is_fatal() {
                        return ExitReason::Failed(e);
                    }
                    if consecutive_failures >= self.config.max_consecutive_failures {
                        return ExitReason::Failed(escalate(e, consecutive_failures));
                    }

                    tracing::warn!(
                        error = %e,
                        attempt = consecutive_failures,
                        max = self.config.max_consecutive_failures,
                        "Frame grab failed, retrying"
                    );
                    if self.wait_for_stop(self.config.retry_backoff) {
                        return ExitReason::Stopped;
                    }
                }
            }

            self.governor.schedule_next(Instant::now());
            self.counters.set_overruns(self.governor.overruns());
        }
    }

    /// Non-blocking check of the stop signal
    fn stop_requested(&self) -> bool {
        match self.stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Idle for up to `wait`; returns true if stop arrived meanwhile
    fn wait_for_stop(&self, wait: Duration) -> bool {
        if wait.is_zero() {
            return self.stop_requested();
        }
        match self.stop_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

/// Turn the last of a run of grab failures into the fatal error reported
fn escalate(error: CaptureError, attempts: u32) -> CaptureError {
    match error {
        CaptureError::CaptureTimeout(wait) => CaptureError::DeviceDisconnected(format!(
            "no frame after {} attempts ({} ms timeout each)",
            attempts,
            wait.as_millis()
        )),
        other => other,
    }
}
