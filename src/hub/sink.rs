//! Subscriber sinks
//!
//! A sink is any outbound delivery handle that can accept one payload without
//! blocking. Anything that would block must report `Full` instead.

use tokio::sync::mpsc;

use crate::encode::EncodedPayload;
use crate::error::DeliveryError;

/// Non-blocking delivery target for encoded frames
pub trait FrameSink: Send + Sync + 'static {
    /// Hand over one payload, or report why it could not be taken right now
    fn try_deliver(&self, payload: EncodedPayload) -> Result<(), DeliveryError>;
}

impl FrameSink for mpsc::Sender<EncodedPayload> {
    fn try_deliver(&self, payload: EncodedPayload) -> Result<(), DeliveryError> {
        self.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Sink backed by a closure
pub struct FnSink<F>(pub F);

impl<F> FrameSink for FnSink<F>
where
    F: Fn(EncodedPayload) -> Result<(), DeliveryError> + Send + Sync + 'static,
{
    fn try_deliver(&self, payload: EncodedPayload) -> Result<(), DeliveryError> {
        (self.0)(payload)
    }
}
