//! V4L2 capture backend
//!
//! Opens a local video device through libv4l, whose format conversion lets
//! YUYV and MJPG webcams deliver RGB24. The ring holds `buffer_depth + 1`
//! mmap buffers: one is always held by the grabber, the rest are queued for
//! the driver. `grab` drains every filled buffer and returns only the newest.

use std::io;
use std::time::Duration;

use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;

use crate::error::CaptureError;

use super::config::CaptureConfig;
use super::frame::RawFrame;
use super::queue::{grab_newest, pack_rows, BufferQueue};
use super::source::{CaptureSource, FrameGrabber};

const RGB24: &[u8; 4] = b"RGB3";

/// V4L2 device source
pub struct V4l2Source {
    device: String,
}

impl V4l2Source {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl CaptureSource for V4l2Source {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameGrabber>, CaptureError> {
        config.validate()?;

        let device = v4l::Device::with_path(&self.device)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", self.device, e)))?;

        let mut format = device
            .format()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("read format: {}", e)))?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(RGB24);

        let format = device
            .set_format(&format)
            .map_err(|e| CaptureError::InvalidConfig(format!("set format: {}", e)))?;
        if format.width != config.width
            || format.height != config.height
            || format.fourcc != v4l::FourCC::new(RGB24)
        {
            return Err(CaptureError::InvalidConfig(format!(
                "device negotiated {}x{} {} instead of {}x{} RGB3",
                format.width, format.height, format.fourcc, config.width, config.height
            )));
        }

        let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
        if let Err(e) = device.set_params(&params) {
            tracing::warn!(device = %self.device, error = %e, "Failed to set frame rate");
        }

        let ring = DeviceRing {
            device,
            stream: None,
            buffers: config.buffer_depth.saturating_add(1),
        };

        tracing::info!(
            device = %self.device,
            width = format.width,
            height = format.height,
            stride = format.stride,
            fps = config.target_fps,
            buffers = ring.buffers,
            "V4L2 device opened"
        );

        Ok(Box::new(V4l2Grabber {
            ring: Some(ring),
            device: self.device.clone(),
            config: config.clone(),
            stride: format.stride as usize,
            sequence: 0,
        }))
    }

    fn describe(&self) -> String {
        format!("v4l2 device {}", self.device)
    }
}

/// mmap buffer ring of an open device
///
/// The stream is created lazily and dropped on `reset`, which stops
/// streaming and releases every buffer.
struct DeviceRing {
    device: v4l::Device,
    stream: Option<MmapStream<'static>>,
    buffers: u32,
}

/// Copy out the bytes the driver filled
fn filled(buf: &[u8], meta: &v4l::buffer::Metadata) -> Vec<u8> {
    let used = (meta.bytesused as usize).min(buf.len());
    if used == 0 {
        buf.to_vec()
    } else {
        buf[..used].to_vec()
    }
}

impl BufferQueue for DeviceRing {
    fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    fn start(&mut self, wait: Duration) -> io::Result<Vec<u8>> {
        let mut stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffers)?;
        stream.set_timeout(wait);

        // First call queues the whole ring and turns streaming on
        let data = {
            let (buf, meta) = stream.next()?;
            filled(buf, meta)
        };
        self.stream = Some(stream);
        Ok(data)
    }

    fn poll_ready(&self, wait: Duration) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: self.device.handle().fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout = wait.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let ready = unsafe { libc::poll(&mut fd, 1, timeout) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            return if err.kind() == io::ErrorKind::Interrupted {
                Ok(false)
            } else {
                Err(err)
            };
        }
        if ready == 0 {
            return Ok(false);
        }
        if fd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("device poll reported revents {:#x}", fd.revents),
            ));
        }
        Ok(fd.revents & libc::POLLIN != 0)
    }

    fn take_next(&mut self) -> io::Result<Vec<u8>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream not started"))?;
        let (buf, meta) = stream.next()?;
        Ok(filled(buf, meta))
    }

    fn reset(&mut self) -> io::Result<()> {
        self.stream = None;
        Ok(())
    }

    fn depth(&self) -> u32 {
        self.buffers
    }
}

struct V4l2Grabber {
    ring: Option<DeviceRing>,
    device: String,
    config: CaptureConfig,
    stride: usize,
    sequence: u64,
}

impl FrameGrabber for V4l2Grabber {
    fn grab(&mut self) -> Result<RawFrame, CaptureError> {
        let ring = self
            .ring
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceDisconnected("handle closed".into()))?;

        let (raw, taken) = grab_newest(ring, self.config.grab_timeout)?;
        if taken > 1 {
            tracing::trace!(device = %self.device, stale = taken - 1, "Discarded stale frames");
        }
        self.sequence += taken;

        let row_len = self.config.width as usize * 3;
        // A short buffer falls through unchanged and is rejected by the encoder
        let data = pack_rows(&raw, row_len, self.stride, self.config.height as usize).unwrap_or(raw);

        Ok(RawFrame::rgb(
            data,
            self.config.width,
            self.config.height,
            self.sequence,
        ))
    }

    fn close(&mut self) {
        if self.ring.take().is_some() {
            tracing::info!(device = %self.device, "V4L2 device closed");
        }
    }

    fn is_open(&self) -> bool {
        self.ring.is_some()
    }
}

impl Drop for V4l2Grabber {
    fn drop(&mut self) {
        self.close();
    }
}
