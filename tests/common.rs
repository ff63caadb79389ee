// tests/common.rs
#![allow(dead_code)]

use parking_lot::Mutex;
use sse_connector_rs::transport::{Transport, TransportFactory, TransportSink};
use sse_connector_rs::types::{ConnectionStatus, ErrorEvent, ErrorKind, MessageEvent};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use url::Url;

static INIT: Once = Once::new();

// Loads .env (if any) and installs a test logger.
// Uses std::sync::Once to ensure it only runs once across all tests.
pub fn setup() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        env_logger::builder().is_test(true).try_init().ok();
    });
}

/// Test-side view of one transport the client created.
#[derive(Clone)]
pub struct MockHandle {
    pub id: usize,
    pub url: String,
    sink: Arc<Mutex<Option<TransportSink>>>,
    open_calls: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MockHandle {
    fn sink(&self) -> TransportSink {
        self.sink
            .lock()
            .clone()
            .expect("transport was never opened")
    }

    pub fn open(&self) {
        let _ = self.sink().open();
    }

    pub fn message(&self, data: &str) {
        let _ = self.sink().message(MessageEvent::new(data));
    }

    pub fn error(&self) {
        let _ = self
            .sink()
            .error(ErrorEvent::new(ErrorKind::Stream, "mock failure"));
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockTransport {
    handle: MockHandle,
}

impl Transport for MockTransport {
    fn open(&mut self, sink: TransportSink) {
        self.handle.open_calls.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.handle.sink.lock();
        if slot.is_none() {
            *slot = Some(sink);
        }
    }

    fn close(&mut self) {
        self.handle.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every transport it creates so tests can script notifications.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    created: Arc<Mutex<Vec<MockHandle>>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    pub fn last(&self) -> MockHandle {
        self.created
            .lock()
            .last()
            .cloned()
            .expect("no transport created yet")
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, url: &Url) -> Box<dyn Transport> {
        let mut created = self.created.lock();
        let handle = MockHandle {
            id: created.len() + 1,
            url: url.to_string(),
            sink: Arc::new(Mutex::new(None)),
            open_calls: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };
        created.push(handle.clone());
        Box::new(MockTransport { handle })
    }
}

/// Status observer that forwards every transition into a channel.
pub fn status_channel() -> (
    impl Fn(ConnectionStatus) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<ConnectionStatus>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer = move |status: ConnectionStatus| {
        let _ = tx.send(status);
    };
    (observer, rx)
}

pub async fn next_status(rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>) -> ConnectionStatus {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timeout waiting for status transition")
        .expect("Status channel closed unexpectedly")
}

/// Asserts that no further transition arrives within `wait`.
pub async fn assert_no_status(rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>, wait: Duration) {
    if let Ok(Some(status)) = timeout(wait, rx.recv()).await {
        panic!("Unexpected status transition: {}", status);
    }
}
