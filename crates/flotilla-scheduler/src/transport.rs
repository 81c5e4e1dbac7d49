//! Outbound transport seam.
//!
//! The scheduler hands every call to a [`Transport`] and is done with it.
//! Encoding, HTTP streaming and reconnects belong to the implementation.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use flotilla_protocol::Call;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

/// Accepts outbound calls for delivery to the master.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, call: Call) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, call: Call) -> Result<(), TransportError> {
        (**self).send(call).await
    }
}

/// Transport that forwards calls into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Call>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Call>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, call: Call) -> Result<(), TransportError> {
        self.tx.send(call).await.map_err(|_| TransportError::Closed)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use parking_lot::Mutex;

    /// Records calls; can be switched to fail every send.
    #[derive(Default)]
    pub struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
        failing: Mutex<bool>,
    }

    impl RecordingTransport {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        pub fn kinds(&self) -> Vec<&'static str> {
            self.calls.lock().iter().map(Call::kind).collect()
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock() = failing;
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, call: Call) -> Result<(), TransportError> {
            if *self.failing.lock() {
                return Err(TransportError::Send("connection reset".to_string()));
            }
            self.calls.lock().push(call);
            Ok(())
        }
    }
}
