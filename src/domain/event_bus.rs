//! Event bus: one FIFO queue plus a registry of handlers per event kind.
//!
//! Two dispatch modes exist. [`EventBus::drain`] processes the queue synchronously until
//! it is empty, including everything handlers publish along the way; this is what a
//! backtest uses. [`EventBus::run`] blocks on an inbound channel fed by other threads and
//! loops until its [`StopHandle`] is flipped. A bus remembers the first mode it was used
//! in and refuses the other one.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::error::BusError;
use super::event::{Event, EventKind};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A component that reacts to events.
///
/// Handlers only mutate their own state and talk to the rest of the system by
/// publishing into the [`Outbox`].
pub trait EventHandler {
    fn handle(&mut self, event: &Event, outbox: &mut Outbox<'_>);
}

pub type SharedHandler = Rc<RefCell<dyn EventHandler>>;

/// Write end of the queue handed to handlers during dispatch.
pub struct Outbox<'a> {
    queue: &'a mut VecDeque<Event>,
}

impl<'a> Outbox<'a> {
    pub fn new(queue: &'a mut VecDeque<Event>) -> Self {
        Outbox { queue }
    }

    pub fn publish(&mut self, event: impl Into<Event>) {
        self.queue.push_back(event.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Drain,
    Run,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Drain => f.write_str("drain"),
            DispatchMode::Run => f.write_str("run"),
        }
    }
}

/// Cloneable, `Send` handle for publishing into a running bus from another thread.
#[derive(Debug, Clone)]
pub struct EventSender(Sender<Event>);

impl EventSender {
    /// Returns false once the bus is gone.
    pub fn publish(&self, event: impl Into<Event>) -> bool {
        self.0.send(event.into()).is_ok()
    }
}

/// Flips the bus's active flag; checked between dequeues in [`EventBus::run`].
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct EventBus {
    queue: VecDeque<Event>,
    handlers: HashMap<EventKind, Vec<SharedHandler>>,
    mode: Option<DispatchMode>,
    inbound_tx: Sender<Event>,
    inbound_rx: Option<Receiver<Event>>,
    active: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel();
        EventBus {
            queue: VecDeque::new(),
            handlers: HashMap::new(),
            mode: None,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            active: Arc::new(AtomicBool::new(true)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Adds `handler` for `kind`. Returns false if it was already registered.
    pub fn register(&mut self, kind: EventKind, handler: SharedHandler) -> bool {
        let list = self.handlers.entry(kind).or_default();
        if list.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        list.push(handler);
        true
    }

    /// Removes `handler` from `kind`. Returns false if it was not registered.
    pub fn unregister(&mut self, kind: EventKind, handler: &SharedHandler) -> bool {
        match self.handlers.get_mut(&kind) {
            Some(list) => {
                let before = list.len();
                list.retain(|h| !same_handler(h, handler));
                list.len() != before
            }
            None => false,
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    pub fn publish(&mut self, event: impl Into<Event>) {
        self.queue.push_back(event.into());
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn mode(&self) -> Option<DispatchMode> {
        self.mode
    }

    pub fn sender(&self) -> EventSender {
        EventSender(self.inbound_tx.clone())
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.active))
    }

    /// Dispatches queued events, and everything they cascade into, until the queue is
    /// empty. Returns the number of events processed.
    pub fn drain(&mut self) -> Result<usize, BusError> {
        self.enter(DispatchMode::Drain)?;
        let mut processed = 0;
        while let Some(event) = self.queue.pop_front() {
            self.dispatch(&event);
            processed += 1;
        }
        Ok(processed)
    }

    /// Processes local and inbound events until stopped. Returns the number of events
    /// processed.
    pub fn run(&mut self) -> Result<usize, BusError> {
        self.enter(DispatchMode::Run)?;
        let Some(receiver) = self.inbound_rx.take() else {
            return Ok(0);
        };

        let mut processed = 0;
        while self.active.load(Ordering::SeqCst) {
            if let Some(event) = self.queue.pop_front() {
                self.dispatch(&event);
                processed += 1;
                continue;
            }
            match receiver.recv_timeout(self.poll_interval) {
                Ok(event) => self.queue.push_back(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.inbound_rx = Some(receiver);
        tracing::debug!(processed, "event bus stopped");
        Ok(processed)
    }

    fn enter(&mut self, requested: DispatchMode) -> Result<(), BusError> {
        match self.mode {
            None => {
                self.mode = Some(requested);
                Ok(())
            }
            Some(active) if active == requested => Ok(()),
            Some(active) => Err(BusError::ModeConflict { active, requested }),
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            tracing::trace!(kind = ?event.kind(), "no handlers registered");
            return;
        };
        let mut outbox = Outbox::new(&mut self.queue);
        for handler in handlers {
            match handler.try_borrow_mut() {
                Ok(mut h) => h.handle(event, &mut outbox),
                Err(_) => tracing::error!(
                    kind = ?event.kind(),
                    symbol = event.symbol(),
                    "handler is already borrowed, event skipped for it"
                ),
            }
        }
    }
}

fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
