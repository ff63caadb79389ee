//! Event stream transport boundary.
//!
//! The client never touches the wire. A [`Transport`] opens a stream to the
//! target URL and reports what happens on it through a [`TransportSink`]:
//!
//! - `open` once per successful connection
//! - `message` once per received event, one at a time
//! - `error` on any failure, including the server ending the stream
//!
//! [`HttpTransport`] is the default implementation. Custom transports are
//! plugged in through [`ClientOptions::transport`](crate::config::ClientOptions::transport).

pub mod http;

use crate::error::{ConnectorError, Result};
use crate::types::{ErrorEvent, MessageEvent};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use url::Url;

pub use http::{HttpTransport, HttpTransportConfig, HttpTransportFactory};

/// A notification emitted by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(MessageEvent),
    Error(ErrorEvent),
}

/// A notification tagged with the connection generation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub generation: u64,
    pub event: TransportEvent,
}

// Type alias for the delivery callback; returns false once the receiver is gone
type Deliver = Arc<dyn Fn(Notification) -> bool + Send + Sync + 'static>;

/// Where a transport delivers its notifications.
///
/// Each sink belongs to one connection generation. Once the client has
/// closed that connection, anything still sent through the sink is ignored.
#[derive(Clone)]
pub struct TransportSink {
    generation: u64,
    deliver: Deliver,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, deliver: Deliver) -> Self {
        Self {
            generation,
            deliver,
        }
    }

    /// Builds a detached sink whose notifications can be read back directly,
    /// for driving a transport on its own.
    pub fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let deliver: Deliver =
            Arc::new(move |notification: Notification| tx.send(notification).is_ok());
        (Self::new(generation, deliver), rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn open(&self) -> Result<()> {
        self.send(TransportEvent::Open)
    }

    pub fn message(&self, event: MessageEvent) -> Result<()> {
        self.send(TransportEvent::Message(event))
    }

    pub fn error(&self, event: ErrorEvent) -> Result<()> {
        self.send(TransportEvent::Error(event))
    }

    /// Fails with [`ConnectorError::ClientShutDown`] once the owning client is gone.
    pub fn send(&self, event: TransportEvent) -> Result<()> {
        let delivered = (self.deliver)(Notification {
            generation: self.generation,
            event,
        });
        if delivered {
            Ok(())
        } else {
            Err(ConnectorError::ClientShutDown)
        }
    }
}

impl fmt::Debug for TransportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSink")
            .field("generation", &self.generation)
            .finish()
    }
}

/// A single persistent event stream connection.
pub trait Transport: Send {
    /// Begins streaming. Calling it again on an open transport does nothing.
    fn open(&mut self, sink: TransportSink);

    /// Stops streaming and releases resources. No notification is emitted.
    fn close(&mut self);
}

/// Creates a fresh [`Transport`] for every connection the client makes.
pub trait TransportFactory: Send + Sync {
    fn create(&self, url: &Url) -> Box<dyn Transport>;
}
