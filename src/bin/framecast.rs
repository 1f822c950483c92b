//! framecast - capture a camera and serve it to WebSocket viewers
//!
//! ```text
//! framecast --device /dev/video0 --fps 30 --quality 70 --bind 0.0.0.0:5000
//! framecast --device synthetic://test
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use framecast::capture::{CaptureConfig, CaptureSource, SyntheticSource, SYNTHETIC_PREFIX};
use framecast::{BroadcastHub, HubConfig, PipelineConfig, PipelineController, ServerConfig, StreamServer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Live camera capture and broadcast over WebSocket")]
struct Args {
    /// Capture device path, or synthetic://<name> for generated frames.
    #[arg(long, env = "FRAMECAST_DEVICE", default_value = "/dev/video0")]
    device: String,

    /// Frame width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Target frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// JPEG quality (0-100).
    #[arg(long, default_value_t = 70)]
    quality: u32,

    /// Device buffer depth in frames.
    #[arg(long, default_value_t = 1)]
    buffer_depth: u32,

    /// Viewer server bind address.
    #[arg(long, env = "FRAMECAST_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Maximum concurrent viewers (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Consecutive missed frames before a viewer is dropped.
    #[arg(long, default_value_t = 60)]
    max_missed_frames: u32,
}

fn select_source(device: &str) -> Arc<dyn CaptureSource> {
    if device.starts_with(SYNTHETIC_PREFIX) {
        Arc::new(SyntheticSource::new())
    } else {
        device_source(device)
    }
}

#[cfg(feature = "v4l2")]
fn device_source(device: &str) -> Arc<dyn CaptureSource> {
    Arc::new(framecast::capture::V4l2Source::new(device))
}

#[cfg(not(feature = "v4l2"))]
fn device_source(device: &str) -> Arc<dyn CaptureSource> {
    tracing::warn!(
        device = %device,
        "Built without the v4l2 feature; camera devices cannot be opened"
    );
    Arc::new(SyntheticSource::new().unavailable())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let capture_config = CaptureConfig::with_device(args.device.clone())
        .resolution(args.width, args.height)
        .target_fps(args.fps)
        .quality(args.quality)
        .buffer_depth(args.buffer_depth);

    let hub = Arc::new(BroadcastHub::with_config(
        HubConfig::default().max_missed_frames(args.max_missed_frames),
    ));

    let controller = Arc::new(PipelineController::with_config(
        select_source(&args.device),
        capture_config,
        PipelineConfig::default(),
        Arc::clone(&hub),
    ));

    // The viewer server still comes up if the camera is missing
    let starter = Arc::clone(&controller);
    match tokio::task::spawn_blocking(move || starter.start()).await? {
        Ok(()) => tracing::info!(device = %args.device, "Capture started"),
        Err(e) => tracing::error!(device = %args.device, error = %e, "Capture failed to start"),
    }

    let server_config = ServerConfig::with_addr(args.bind).max_connections(args.max_connections);
    let server = StreamServer::new(server_config, hub);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let stopper = Arc::clone(&controller);
    if stopper.state().has_worker() {
        tokio::task::spawn_blocking(move || stopper.stop()).await??;
    }

    let stats = controller.stats();
    tracing::info!(
        frames_published = stats.frames_published,
        capture_errors = stats.capture_errors,
        uptime_secs = stats.uptime.as_secs(),
        "Shut down"
    );

    Ok(())
}
