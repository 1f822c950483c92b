//! End-to-end pipeline behaviour against the synthetic camera

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_test::{assert_err, assert_ok};

use framecast::capture::{CaptureConfig, CaptureSource, SyntheticSource};
use framecast::hub::{FnSink, FrameSink};
use framecast::{
    BroadcastHub, CaptureError, DeliveryError, EncodedPayload, PipelineConfig,
    PipelineController, PipelineError, PipelineState,
};

fn small_config(fps: u32) -> CaptureConfig {
    CaptureConfig::with_device("synthetic://it")
        .resolution(8, 8)
        .target_fps(fps)
}

fn controller_with(
    source: SyntheticSource,
    capture_config: CaptureConfig,
    config: PipelineConfig,
) -> (PipelineController, Arc<SyntheticSource>) {
    let source = Arc::new(source);
    let controller = PipelineController::with_config(
        Arc::clone(&source) as Arc<dyn CaptureSource>,
        capture_config,
        config,
        Arc::new(BroadcastHub::new()),
    );
    (controller, source)
}

fn counting_sink(counter: &Arc<AtomicU64>) -> impl FrameSink {
    let counter = Arc::clone(counter);
    FnSink(move |_payload: EncodedPayload| -> Result<(), DeliveryError> {
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn start_then_stop_releases_device() {
    let (controller, source) =
        controller_with(SyntheticSource::new(), small_config(30), PipelineConfig::default());

    assert_ok!(controller.start());
    assert_ok!(controller.stop());
    assert!(!source.stats().in_use);

    // Same config opens again only if the first handle was closed
    assert_ok!(controller.start());
    assert_eq!(controller.state(), PipelineState::Running);
    assert_ok!(controller.stop());

    let stats = source.stats();
    assert_eq!(stats.opens, 2);
    assert_eq!(stats.closes, 2);
}

#[test]
fn cadence_holds_over_ten_seconds() {
    let (controller, _source) =
        controller_with(SyntheticSource::new(), small_config(30), PipelineConfig::default());

    assert_ok!(controller.start());
    std::thread::sleep(Duration::from_secs(10));
    assert_ok!(controller.stop());

    let published = controller.stats().frames_published;
    assert!(
        (285..=315).contains(&published),
        "published {} frames, expected 300 +/- 5%",
        published
    );
}

#[test]
fn double_unsubscribe_is_noop() {
    let (controller, _source) =
        controller_with(SyntheticSource::new(), small_config(30), PipelineConfig::default());
    let (id, _rx) = controller.subscribe_channel();
    let (other, _other_rx) = controller.subscribe_channel();

    controller.unsubscribe(id);
    controller.unsubscribe(id);

    assert!(!controller.hub().is_registered(id));
    assert!(controller.hub().is_registered(other));
    assert_eq!(controller.hub().subscriber_count(), 1);
}

#[test]
fn stalled_subscriber_does_not_slow_others() {
    let (controller, _source) =
        controller_with(SyntheticSource::new(), small_config(30), PipelineConfig::default());

    let first = Arc::new(AtomicU64::new(0));
    let second = Arc::new(AtomicU64::new(0));
    controller.subscribe(counting_sink(&first));
    controller.subscribe(counting_sink(&second));

    // Never drained
    let (stalled, _stalled_rx) = controller.subscribe_channel();

    assert_ok!(controller.start());
    std::thread::sleep(Duration::from_secs(3));
    assert_ok!(controller.stop());

    let published = controller.stats().frames_published;
    assert!(published >= 81, "pipeline published only {} frames", published);
    assert_eq!(first.load(Ordering::Relaxed), published);
    assert_eq!(second.load(Ordering::Relaxed), published);

    // 60 consecutive misses at 30 fps is about two seconds
    assert!(!controller.hub().is_registered(stalled));
    assert_eq!(controller.hub().stats().dropped_slow, 1);
}

#[test]
fn single_subscriber_sees_increasing_sequences() {
    let (controller, _source) =
        controller_with(SyntheticSource::new(), small_config(60), PipelineConfig::default());
    let (_id, mut rx) = controller.subscribe_channel();

    assert_ok!(controller.start());

    let mut sequences = Vec::new();
    while sequences.len() < 20 {
        let payload = rx.blocking_recv().expect("subscription closed early");
        sequences.push(payload.sequence);
        // Slower than the pipeline, so some frames are skipped
        std::thread::sleep(Duration::from_millis(25));
    }
    assert_ok!(controller.stop());

    assert!(
        sequences.windows(2).all(|w| w[0] < w[1]),
        "sequences out of order: {:?}",
        sequences
    );
}

#[test]
fn unavailable_device_stays_idle() {
    let config = CaptureConfig::with_device("/dev/video9")
        .resolution(640, 480)
        .target_fps(30)
        .quality(70);
    let (controller, _source) =
        controller_with(SyntheticSource::new().unavailable(), config, PipelineConfig::default());

    let err = assert_err!(controller.start());
    assert!(matches!(
        err,
        PipelineError::Capture(CaptureError::DeviceUnavailable(_))
    ));
    assert_eq!(controller.state(), PipelineState::Idle);
}

#[test]
fn three_frames_reach_subscriber_in_order() {
    // Three good frames, then the device stalls long enough to inspect
    let source = SyntheticSource::new()
        .then_succeed(3)
        .then_fail_forever(CaptureError::CaptureTimeout(Duration::from_millis(1)));
    let config = PipelineConfig::default().retry_backoff(Duration::from_secs(1));
    let (controller, _source) = controller_with(source, small_config(30), config);

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink_received = Arc::clone(&received);
    controller.subscribe(FnSink(move |payload: EncodedPayload| -> Result<(), DeliveryError> {
        sink_received.lock().unwrap().push(payload);
        Ok(())
    }));

    assert_ok!(controller.start());
    wait_until("three frames", || received.lock().unwrap().len() >= 3);
    std::thread::sleep(Duration::from_millis(300));

    let frames = received.lock().unwrap().clone();
    assert_eq!(frames.len(), 3);
    assert!(frames.windows(2).all(|w| w[0].captured_at < w[1].captured_at));
    assert!(frames.iter().all(|f| f.data.starts_with(&[0xFF, 0xD8])));

    assert_ok!(controller.stop());
}

#[test]
fn five_grab_failures_then_stop() {
    let source = SyntheticSource::new()
        .then_fail(CaptureError::DeviceDisconnected("unplugged".into()), 5);
    let config = PipelineConfig::default().retry_backoff(Duration::from_millis(1));
    let (controller, source) = controller_with(source, small_config(30), config);

    assert_ok!(controller.start());
    wait_until("failed state", || controller.state() == PipelineState::Failed);
    assert_eq!(controller.stats().capture_errors, 5);

    assert_ok!(controller.stop());
    assert_eq!(controller.state(), PipelineState::Stopped);
    assert!(!source.stats().in_use);
}

#[test]
fn bad_frame_is_skipped_and_loop_continues() {
    let source = SyntheticSource::new().then_succeed(2).then_truncated(3);
    let (controller, _source) =
        controller_with(source, small_config(60), PipelineConfig::default());
    let (_id, mut rx) = controller.subscribe_channel();

    assert_ok!(controller.start());

    let mut sequences = Vec::new();
    while sequences.len() < 4 {
        let payload = rx.blocking_recv().expect("subscription closed early");
        sequences.push(payload.sequence);
    }

    assert_eq!(controller.state(), PipelineState::Running);
    let stats = controller.stats();
    assert_eq!(stats.encode_errors, 3);
    assert_eq!(stats.capture_errors, 0);
    assert_ok!(controller.stop());

    // Frames 3 to 5 never reached the hub
    assert_eq!(&sequences[..2], &[1, 2]);
    assert!(sequences[2] >= 6, "got {:?}", sequences);
}

#[test]
fn stop_returns_within_one_interval_plus_grab_timeout() {
    let config = small_config(1).grab_timeout(Duration::from_millis(500));
    let source = SyntheticSource::new().frame_delay(Duration::from_millis(300));
    let (controller, _source) = controller_with(source, config, PipelineConfig::default());
    let (_id, mut rx) = controller.subscribe_channel();

    assert_ok!(controller.start());
    rx.blocking_recv().expect("no first frame");

    // The loop is now idling toward a deadline about one second away
    let stopping = Instant::now();
    assert_ok!(controller.stop());
    let elapsed = stopping.elapsed();

    assert!(
        elapsed < Duration::from_millis(1500),
        "stop took {:?}",
        elapsed
    );
    assert_eq!(controller.state(), PipelineState::Stopped);
}
