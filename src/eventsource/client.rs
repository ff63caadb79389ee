use super::processor::{report_fault, SequentialProcessor};
use super::reconnect::ReconnectState;
use crate::config::{ClientOptions, FaultObserver, StatusObserver};
use crate::error::{ConnectorError, Result};
use crate::transport::{
    HttpTransportConfig, HttpTransportFactory, Notification, Transport, TransportEvent,
    TransportFactory, TransportSink,
};
use crate::types::{ConnectionStatus, ErrorEvent, FaultSource, HandlerFault, MessageEvent};
use log::*;
use parking_lot::RwLock;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::Url;

pub type ErrorHandler = Arc<dyn Fn(ErrorEvent) + Send + Sync + 'static>;

// Type alias for the replaceable error handler slot
type ErrorHandlerSlot = Arc<RwLock<Option<ErrorHandler>>>;

/// State readable from any [`Client`] handle without going through the controller.
#[derive(Debug, Clone, Copy, Default)]
struct Snapshot {
    status: ConnectionStatus,
    attempts: Option<u32>,
}

// Type alias for the shared snapshot
type SharedSnapshot = Arc<RwLock<Snapshot>>;

#[derive(Debug)]
enum Command {
    Connect { ack: oneshot::Sender<()> },
    Close { ack: oneshot::Sender<()> },
    Transport(Notification),
    Reconnect { epoch: u64 },
    // Acknowledged once every earlier command has been applied.
    Sync { ack: oneshot::Sender<()> },
    Shutdown,
}

/// Owns the transport, the status state machine and reconnection.
///
/// Runs as a single task draining one FIFO channel: commands from [`Client`]
/// handles, transport notifications and reconnect timers are handled one at a
/// time, in the order they were sent.
struct Controller {
    url: Url,
    factory: Arc<dyn TransportFactory>,
    transport: Option<Box<dyn Transport>>,
    // Bumped for every transport created; notifications from older ones are stale.
    generation: u64,
    reconnect: Option<ReconnectState>,
    // Bumped by explicit connect/close; a reconnect timer from an older epoch is void.
    reconnect_epoch: u64,
    pending_reconnect: Option<JoinHandle<()>>,
    snapshot: SharedSnapshot,
    status_observer: Option<StatusObserver>,
    fault_observer: Option<FaultObserver>,
    error_handler: ErrorHandlerSlot,
    processor: SequentialProcessor,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Controller {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle_command(command);
        }

        self.cancel_pending_reconnect();
        self.close_transport();
        info!("[Controller] Task finished for {}.", self.url);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { ack } => {
                self.cancel_pending_reconnect();
                self.open_transport();
                let _ = ack.send(());
            }
            Command::Close { ack } => {
                self.cancel_pending_reconnect();
                self.close_transport();
                let _ = ack.send(());
            }
            Command::Transport(notification) => self.handle_notification(notification),
            Command::Reconnect { epoch } => {
                if epoch != self.reconnect_epoch {
                    debug!("[Controller] Ignoring superseded reconnect timer.");
                    return;
                }
                self.pending_reconnect = None;
                info!(
                    "[Controller] Reconnecting (attempt {})...",
                    self.reconnect.as_ref().map_or(0, |r| r.attempts())
                );
                self.open_transport();
            }
            Command::Sync { ack } => {
                let _ = ack.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn handle_notification(&mut self, notification: Notification) {
        if notification.generation != self.generation || self.transport.is_none() {
            trace!(
                "[Controller] Dropping notification from stale transport (generation {}).",
                notification.generation
            );
            return;
        }

        match notification.event {
            TransportEvent::Open => {
                info!("[Controller] Event stream open: {}", self.url);
                self.set_status(ConnectionStatus::Open);
                if let Some(reconnect) = self.reconnect.as_mut() {
                    reconnect.reset();
                }
                self.publish_attempts();
            }
            TransportEvent::Message(event) => {
                trace!("[Controller] Forwarding '{}' message.", event.event);
                self.processor.submit(event);
            }
            TransportEvent::Error(event) => {
                warn!("[Controller] Transport error: {}", event);
                self.invoke_error_handler(event);
                self.close_transport();
                self.schedule_reconnect();
            }
        }
    }

    fn open_transport(&mut self) {
        if self.transport.is_some() {
            debug!("[Controller] Transport already held; connect is a no-op.");
            return;
        }

        self.generation += 1;
        let mut transport = self.factory.create(&self.url);
        self.set_status(ConnectionStatus::Connecting);

        let cmd_tx = self.cmd_tx.clone();
        let sink = TransportSink::new(
            self.generation,
            Arc::new(move |notification: Notification| {
                cmd_tx.send(Command::Transport(notification)).is_ok()
            }),
        );
        transport.open(sink);
        self.transport = Some(transport);
    }

    fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            info!("[Controller] Closing event stream: {}", self.url);
            transport.close();
            self.set_status(ConnectionStatus::Closed);
        }
    }

    fn schedule_reconnect(&mut self) {
        let Some(reconnect) = self.reconnect.as_mut() else {
            return;
        };

        let Some(delay) = reconnect.next_delay() else {
            warn!(
                "[Controller] Max reconnect attempts ({}) reached. Staying closed.",
                reconnect.max_attempts()
            );
            return;
        };

        warn!(
            "[Controller] Reconnect attempt {}/{} in {:?}.",
            reconnect.attempts(),
            reconnect.max_attempts(),
            delay
        );
        self.publish_attempts();

        let epoch = self.reconnect_epoch;
        let cmd_tx = self.cmd_tx.clone();
        self.pending_reconnect = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = cmd_tx.send(Command::Reconnect { epoch });
        }));
    }

    fn cancel_pending_reconnect(&mut self) {
        self.reconnect_epoch += 1;
        if let Some(timer) = self.pending_reconnect.take() {
            debug!("[Controller] Cancelling pending reconnect.");
            timer.abort();
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        {
            let mut snapshot = self.snapshot.write();
            if snapshot.status == status {
                return;
            }
            snapshot.status = status;
        }

        debug!("[Controller] Status -> {}", status);
        if let Some(observer) = &self.status_observer {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| observer(status))) {
                report_fault(
                    self.fault_observer.as_ref(),
                    HandlerFault::from_panic(FaultSource::StatusObserver, payload),
                );
            }
        }
    }

    fn publish_attempts(&self) {
        self.snapshot.write().attempts = self.reconnect.as_ref().map(|r| r.attempts());
    }

    fn invoke_error_handler(&self, event: ErrorEvent) {
        let handler = self.error_handler.read().clone();
        if let Some(handler) = handler {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                report_fault(
                    self.fault_observer.as_ref(),
                    HandlerFault::from_panic(FaultSource::ErrorHandler, payload),
                );
            }
        }
    }
}

struct ClientInner {
    url: Url,
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot: SharedSnapshot,
    error_handler: ErrorHandlerSlot,
    processor: SequentialProcessor,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

/// A server-sent event stream client.
///
/// Messages are handed to the handler registered with [`on`](Client::on) one
/// at a time and in arrival order, even when the handler is slow. Transport
/// errors go to the [`catch`](Client::catch) handler, close the connection and,
/// with a [`ReconnectPolicy`](crate::config::ReconnectPolicy), schedule a
/// bounded number of reconnects.
///
/// `Client` is a cheap handle; clones control the same connection. The
/// connection is torn down when the last handle is dropped.
///
/// # Examples
///
/// ```no_run
/// use sse_connector_rs::config::{ClientOptions, ReconnectPolicy};
/// use sse_connector_rs::eventsource::Client;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let options = ClientOptions::new()
///         .status_observer(|status| println!("status: {}", status))
///         .reconnect(ReconnectPolicy::new(3, Duration::from_millis(500)));
///
///     let client = Client::new("http://localhost:8080/events", options)
///         .expect("Failed to create client");
///
///     client.on(|message| async move {
///         println!("Received: {}", message.data);
///     });
///     client.catch(|error| eprintln!("Stream error: {}", error));
///
///     client.connect().await.expect("Client shut down");
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a client bound to `url`. Nothing is connected until
    /// [`connect`](Client::connect) is called.
    ///
    /// Must be called within a Tokio runtime: the controller and message
    /// worker run as tasks on it.
    pub fn new(url: &str, options: ClientOptions) -> Result<Self> {
        let url = Url::parse(url)?;
        if let Some(policy) = &options.reconnect {
            policy.validate()?;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ConnectorError::InvalidConfig(
                "Client must be created within a Tokio runtime".to_string(),
            ));
        }

        let factory: Arc<dyn TransportFactory> = match options.transport {
            Some(factory) => factory,
            None => Arc::new(HttpTransportFactory::new(HttpTransportConfig::default())?),
        };

        let reconnect = options.reconnect.map(ReconnectState::new);
        let snapshot: SharedSnapshot = Arc::new(RwLock::new(Snapshot {
            status: ConnectionStatus::Closed,
            attempts: reconnect.as_ref().map(|r| r.attempts()),
        }));
        let error_handler: ErrorHandlerSlot = Arc::new(RwLock::new(None));
        let processor = SequentialProcessor::new(options.fault_observer.clone());

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let controller = Controller {
            url: url.clone(),
            factory,
            transport: None,
            generation: 0,
            reconnect,
            reconnect_epoch: 0,
            pending_reconnect: None,
            snapshot: Arc::clone(&snapshot),
            status_observer: options.status_observer,
            fault_observer: options.fault_observer,
            error_handler: Arc::clone(&error_handler),
            processor: processor.clone(),
            cmd_tx: cmd_tx.clone(),
        };
        tokio::spawn(controller.run(cmd_rx));

        Ok(Self {
            inner: Arc::new(ClientInner {
                url,
                cmd_tx,
                snapshot,
                error_handler,
                processor,
            }),
        })
    }

    /// Opens the transport and moves to CONNECTING. Does nothing if a
    /// transport is already held. Returns once the controller has applied it.
    pub async fn connect(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Connect { ack })?;
        done.await.map_err(|_| ConnectorError::ClientShutDown)
    }

    /// Closes the transport and moves to CLOSED. Does nothing if already
    /// closed. Does not reset the reconnect attempt counter, but cancels a
    /// pending scheduled reconnect.
    pub async fn close(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Close { ack })?;
        done.await.map_err(|_| ConnectorError::ClientShutDown)
    }

    /// Replaces the message handler.
    pub fn on<F, Fut>(&self, handler: F)
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.processor.set_handler(handler);
    }

    /// Replaces the error handler.
    pub fn catch<F>(&self, handler: F)
    where
        F: Fn(ErrorEvent) + Send + Sync + 'static,
    {
        *self.inner.error_handler.write() = Some(Arc::new(handler));
    }

    pub fn url(&self) -> &str {
        self.inner.url.as_str()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.snapshot.read().status
    }

    /// Reconnect attempts used since the last successful open, or `None`
    /// without a reconnect policy.
    pub fn reconnect_attempts(&self) -> Option<u32> {
        self.inner.snapshot.read().attempts
    }

    /// Resolves once every message the transport has delivered so far has
    /// been handled (or discarded for lack of a handler).
    ///
    /// Never call this from inside a message handler: the running handler
    /// counts as pending, so the call would wait forever.
    pub async fn wait_idle(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.send(Command::Sync { ack })?;
        done.await.map_err(|_| ConnectorError::ClientShutDown)?;
        self.inner.processor.wait_idle().await;
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.inner
            .cmd_tx
            .send(command)
            .map_err(|_| ConnectorError::ClientShutDown)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url())
            .field("status", &self.status())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}
