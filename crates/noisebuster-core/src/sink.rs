//! Output channels
//!
//! Each sink exposes one narrow delivery contract. Disabled sinks are
//! represented by [`NullSink`], which accepts everything, so the fan-out code
//! never branches on feature flags.

use crate::event::{NoiseEvent, Point};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while delivering to a sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{sink} delivery failed: {reason}")]
    Delivery { sink: &'static str, reason: String },

    #[error("{sink} rejected the payload with status {status}: {body}")]
    Rejected {
        sink: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} is not connected")]
    Unavailable(&'static str),
}

/// Time-series store with named targets (buckets)
pub trait TelemetrySink: Send + Sync {
    fn write(&self, target: &str, points: &[Point]) -> Result<(), SinkError>;
}

/// Pub/sub broker; fire-and-forget
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SinkError>;
}

/// Chat or push notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> Result<(), SinkError>;
}

/// Captures an image for a noisy window
pub trait ImageCapturer: Send + Sync {
    fn capture(&self, event: &NoiseEvent) -> Result<(), SinkError>;
}

/// Sink that accepts and discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn write(&self, _target: &str, _points: &[Point]) -> Result<(), SinkError> {
        Ok(())
    }
}

impl Publisher for NullSink {
    fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }
}

impl Notifier for NullSink {
    fn notify(&self, _message: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

impl ImageCapturer for NullSink {
    fn capture(&self, _event: &NoiseEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<T> {
    fn write(&self, target: &str, points: &[Point]) -> Result<(), SinkError> {
        (**self).write(target, points)
    }
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, message: &str) -> Result<(), SinkError> {
        (**self).notify(message)
    }
}

/// Sends one message to several notifiers
///
/// Every notifier is tried; the first failure is reported after all of them
/// ran.
#[derive(Default)]
pub struct NotifierGroup {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for NotifierGroup {
    fn notify(&self, message: &str) -> Result<(), SinkError> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(message) {
                tracing::warn!(error = %e, "Notifier failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
