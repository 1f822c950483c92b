//! Kernel buffer queue handling shared by device backends
//!
//! A streaming camera owns a small ring of buffers. The driver fills queued
//! buffers; the grabber dequeues one, copies it out and hands it back on the
//! next dequeue. Handing a buffer back twice is rejected by the driver, so a
//! dequeue is only attempted once the queue has reported a filled buffer.
//! A wait that expires therefore never touches the ring.

// Only device backends drive the ring
#![cfg_attr(not(feature = "v4l2"), allow(dead_code))]

use std::io;
use std::time::Duration;

use crate::error::CaptureError;

/// Streaming buffer ring of a capture device
pub(crate) trait BufferQueue {
    /// Whether streaming has been started
    fn is_streaming(&self) -> bool;

    /// Queue every buffer, start streaming and wait up to `wait` for the
    /// first filled one
    fn start(&mut self, wait: Duration) -> io::Result<Vec<u8>>;

    /// Wait up to `wait` for a filled buffer; `Duration::ZERO` only checks
    fn poll_ready(&self, wait: Duration) -> io::Result<bool>;

    /// Return the held buffer to the driver and dequeue the next filled one
    ///
    /// Only called after `poll_ready` reported a filled buffer.
    fn take_next(&mut self) -> io::Result<Vec<u8>>;

    /// Stop streaming and release the ring so `start` can begin fresh
    fn reset(&mut self) -> io::Result<()>;

    /// Number of buffers in the ring
    fn depth(&self) -> u32;
}

/// Map an I/O failure from the device to a capture error
pub(crate) fn map_io_error(err: io::Error, wait: Duration) -> CaptureError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CaptureError::CaptureTimeout(wait),
        _ => CaptureError::DeviceDisconnected(err.to_string()),
    }
}

/// Dequeue the newest filled buffer, discarding older ones
///
/// Returns the pixel data and how many buffers were consumed (the newest
/// plus any stale ones drained ahead of it).
pub(crate) fn grab_newest<Q: BufferQueue + ?Sized>(
    queue: &mut Q,
    grab_timeout: Duration,
) -> Result<(Vec<u8>, u64), CaptureError> {
    if !queue.is_streaming() {
        return match queue.start(grab_timeout) {
            Ok(data) => Ok((data, 1)),
            Err(e) => {
                // A failed first dequeue leaves buffers owned by the driver
                if let Err(reset_err) = queue.reset() {
                    tracing::warn!(error = %reset_err, "Failed to reset capture stream");
                }
                Err(map_io_error(e, grab_timeout))
            }
        };
    }

    let mut newest = None;
    let mut taken = 0u64;

    while taken < u64::from(queue.depth())
        && queue
            .poll_ready(Duration::ZERO)
            .map_err(|e| map_io_error(e, grab_timeout))?
    {
        newest = Some(queue.take_next().map_err(|e| map_io_error(e, grab_timeout))?);
        taken += 1;
    }

    if let Some(data) = newest {
        return Ok((data, taken));
    }

    let ready = queue
        .poll_ready(grab_timeout)
        .map_err(|e| map_io_error(e, grab_timeout))?;
    if !ready {
        return Err(CaptureError::CaptureTimeout(grab_timeout));
    }

    let data = queue.take_next().map_err(|e| map_io_error(e, grab_timeout))?;
    Ok((data, 1))
}

/// Strip per-row padding from a strided buffer
///
/// Drivers may report `stride` (bytes per line) wider than the packed row.
/// Returns `None` if the buffer is too short for `height` rows.
pub(crate) fn pack_rows(data: &[u8], row_len: usize, stride: usize, height: usize) -> Option<Vec<u8>> {
    if stride <= row_len {
        let len = row_len.checked_mul(height)?;
        return data.get(..len).map(<[u8]>::to_vec);
    }

    let mut packed = Vec::with_capacity(row_len * height);
    for row in 0..height {
        let start = row.checked_mul(stride)?;
        packed.extend_from_slice(data.get(start..start + row_len)?);
    }
    Some(packed)
}
