use crate::config::FaultObserver;
use crate::types::{FaultSource, HandlerFault, MessageEvent};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::*;
use parking_lot::RwLock;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

pub type MessageHandler =
    Arc<dyn Fn(MessageEvent) -> BoxFuture<'static, ()> + Send + Sync + 'static>;

// Type alias for the replaceable handler slot
type HandlerSlot = Arc<RwLock<Option<MessageHandler>>>;

/// Delivers messages to the registered handler strictly one at a time, in
/// arrival order.
///
/// A single worker task owns the queue. It takes the next message, looks up
/// the handler registered *at that moment*, and awaits the handler's future to
/// completion before taking another. Messages arriving meanwhile wait in the
/// queue; none are dropped unless no handler is registered when their turn
/// comes.
///
/// The queue is unbounded. A stream that outpaces its handler grows memory
/// without limit, and the transport reader is never slowed down.
///
/// Clones share the same queue and handler slot.
#[derive(Clone)]
pub struct SequentialProcessor {
    tx: mpsc::UnboundedSender<MessageEvent>,
    handler: HandlerSlot,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl SequentialProcessor {
    /// Spawns the worker task. Must be called within a Tokio runtime.
    pub fn new(fault_observer: Option<FaultObserver>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: HandlerSlot = Arc::new(RwLock::new(None));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        tokio::spawn(run_worker(
            rx,
            Arc::clone(&handler),
            Arc::clone(&pending),
            Arc::clone(&idle),
            fault_observer,
        ));

        Self {
            tx,
            handler,
            pending,
            idle,
        }
    }

    /// Queues one message for delivery.
    pub fn submit(&self, event: MessageEvent) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(event).is_err() {
            warn!("Message worker is gone; dropping message.");
            self.finish_one();
        }
    }

    /// Replaces the message handler. Messages not yet dispatched will use it.
    pub fn set_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(MessageEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: MessageHandler = Arc::new(move |event| handler(event).boxed());
        *self.handler.write() = Some(handler);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Messages submitted but not yet fully handled, including the one in flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolves once every submitted message has been handled or discarded.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<MessageEvent>,
    handler: HandlerSlot,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    fault_observer: Option<FaultObserver>,
) {
    while let Some(event) = rx.recv().await {
        let current = handler.read().clone();
        match current {
            Some(current) => dispatch(current, event, fault_observer.as_ref()).await,
            None => trace!("No message handler registered; discarding message."),
        }
        if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            idle.notify_waiters();
        }
    }
    debug!("Message worker finished.");
}

async fn dispatch(handler: MessageHandler, event: MessageEvent, faults: Option<&FaultObserver>) {
    let future = match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(future) => future,
        Err(payload) => {
            report_fault(faults, HandlerFault::from_panic(FaultSource::MessageHandler, payload));
            return;
        }
    };
    if let Err(payload) = AssertUnwindSafe(future).catch_unwind().await {
        report_fault(faults, HandlerFault::from_panic(FaultSource::MessageHandler, payload));
    }
}

/// Logs a caught callback panic and hands it to the fault observer, if any.
pub(crate) fn report_fault(observer: Option<&FaultObserver>, fault: HandlerFault) {
    error!("{:?} panicked: {}", fault.source, fault.message);
    if let Some(observer) = observer {
        if panic::catch_unwind(AssertUnwindSafe(|| observer(fault))).is_err() {
            error!("Fault observer panicked.");
        }
    }
}
