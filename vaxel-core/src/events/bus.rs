//! Cooperative dispatch loop.
//!
//! Other threads hand events to the bus through a [`Poster`], which feeds an
//! unbounded crossbeam channel. Only the thread calling [`Bus::run`] (or
//! [`Bus::run_once`]) touches the handler table and the timed queue, so
//! handlers never run concurrently and need no locking of their own.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, error, info, trace, warn};

use super::{
    Envelope, Event, EventError, EventKind, Handler, HandlerId, HandlerTable, Propagation,
    TimedQueue,
};
use crate::cleanup::CleanupRegistry;
use crate::error::BusError;
use crate::time::Clock;

/// Scheduler timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// Length of one dispatch pass. Timed events must be at least this far
    /// in the future when posted.
    pub tick: Duration,
    /// How late a timed event may run before a warning is logged.
    pub tolerance: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            tolerance: Duration::from_millis(100),
        }
    }
}

/// Hooks invoked after each dispatch. Used for metrics.
pub trait DispatchObserver: Send {
    fn on_dispatched(&self, kind: &EventKind, handlers: usize, elapsed: Duration);
    fn on_unhandled(&self, kind: &EventKind);
}

enum Inbound<E> {
    Now(Envelope<E>),
    At(Duration, Envelope<E>),
}

fn check_delay(delay: Duration, tick: Duration) -> Result<(), EventError> {
    if delay < tick {
        return Err(EventError::TooSoon { delay, tick });
    }
    Ok(())
}

/// Thread-safe posting handle.
pub struct Poster<E> {
    tx: Sender<Inbound<E>>,
    clock: Arc<dyn Clock>,
    tick: Duration,
}

impl<E> Clone for Poster<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            clock: Arc::clone(&self.clock),
            tick: self.tick,
        }
    }
}

impl<E: Event> Poster<E> {
    /// Queues `event` for the next dispatch pass.
    pub fn post(&self, event: E) {
        self.send(Inbound::Now(Envelope::broadcast(event)));
    }

    /// Queues `event` for `target` only.
    pub fn post_to(&self, target: HandlerId, event: E) {
        self.send(Inbound::Now(Envelope::private(target, event)));
    }

    /// Queues `event` for delivery once `delay` has elapsed.
    pub fn post_after(&self, delay: Duration, event: E) -> Result<(), EventError> {
        check_delay(delay, self.tick)?;
        let fire_at = self.clock.now() + delay;
        self.send(Inbound::At(fire_at, Envelope::broadcast(event)));
        Ok(())
    }

    fn send(&self, inbound: Inbound<E>) {
        if self.tx.send(inbound).is_err() {
            debug!("Dispatch loop is gone, dropping event");
        }
    }
}

/// Stops a running [`Bus`] at the end of its current pass.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

struct Queues<E> {
    immediate: VecDeque<Envelope<E>>,
    timed: TimedQueue<Envelope<E>>,
    clock: Arc<dyn Clock>,
    tick: Duration,
}

impl<E> Queues<E> {
    fn schedule(&mut self, delay: Duration, envelope: Envelope<E>) -> Result<(), EventError> {
        check_delay(delay, self.tick)?;
        let fire_at = self.clock.now() + delay;
        self.timed.push(fire_at, envelope);
        Ok(())
    }
}

/// What a handler can do while it runs.
pub struct Context<'a, E> {
    queues: &'a mut Queues<E>,
    current: HandlerId,
}

impl<E: Event> Context<'_, E> {
    /// Posts `event` to be dispatched later in the current pass.
    pub fn post(&mut self, event: E) {
        self.queues.immediate.push_back(Envelope::broadcast(event));
    }

    pub fn post_to(&mut self, target: HandlerId, event: E) {
        self.queues.immediate.push_back(Envelope::private(target, event));
    }

    pub fn post_after(&mut self, delay: Duration, event: E) -> Result<(), EventError> {
        self.queues.schedule(delay, Envelope::broadcast(event))
    }

    /// Schedules a private event, typically addressed to
    /// [`Context::current_handler`] for retries.
    pub fn post_after_to(
        &mut self,
        delay: Duration,
        target: HandlerId,
        event: E,
    ) -> Result<(), EventError> {
        self.queues.schedule(delay, Envelope::private(target, event))
    }

    pub fn now(&self) -> Duration {
        self.queues.clock.now()
    }

    pub fn current_handler(&self) -> HandlerId {
        self.current
    }
}

/// Event bus and scheduler.
pub struct Bus<E: Event> {
    config: BusConfig,
    handlers: Vec<Box<dyn Handler<E>>>,
    table: HandlerTable,
    queues: Queues<E>,
    inbox: Receiver<Inbound<E>>,
    poster: Poster<E>,
    cleanup: CleanupRegistry,
    running: Arc<AtomicBool>,
    observer: Option<Box<dyn DispatchObserver>>,
}

impl<E: Event> Bus<E> {
    pub fn new(config: BusConfig, clock: Arc<dyn Clock>, cleanup: CleanupRegistry) -> Self {
        let (tx, inbox) = channel::unbounded();
        let poster = Poster {
            tx,
            clock: Arc::clone(&clock),
            tick: config.tick,
        };
        Self {
            config,
            handlers: Vec::new(),
            table: HandlerTable::new(),
            queues: Queues {
                immediate: VecDeque::new(),
                timed: TimedQueue::new(),
                clock,
                tick: config.tick,
            },
            inbox,
            poster,
            cleanup,
            running: Arc::new(AtomicBool::new(true)),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl DispatchObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn poster(&self) -> Poster<E> {
        self.poster.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn cleanup_registry(&self) -> &CleanupRegistry {
        &self.cleanup
    }

    pub fn config(&self) -> BusConfig {
        self.config
    }

    /// Takes ownership of a handler. It receives nothing until registered
    /// for at least one kind, except private events addressed to it.
    pub fn add_handler(&mut self, handler: impl Handler<E> + 'static) -> HandlerId {
        let id = HandlerId(self.handlers.len());
        debug!(handler = handler.name(), %id, "Handler added");
        self.handlers.push(Box::new(handler));
        id
    }

    /// Appends `handler` to the dispatch list for `kind`.
    ///
    /// Invalid kinds and unknown handlers are logged and ignored. Returns
    /// whether the registration took effect.
    pub fn register(&mut self, kind: impl AsRef<str>, handler: HandlerId) -> bool {
        let kind = match EventKind::parse(kind.as_ref()) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "Registration ignored");
                return false;
            }
        };
        let Some(name) = self.handler_name(handler) else {
            warn!(%kind, %handler, "Registration ignored, no such handler");
            return false;
        };
        debug!(%kind, handler = name, "Registered");
        self.table.register(kind, handler);
        true
    }

    /// Moves `earlier` immediately before `later` in `kind`'s list.
    pub fn reorder(
        &mut self,
        kind: impl AsRef<str>,
        earlier: HandlerId,
        later: HandlerId,
    ) -> Result<(), EventError> {
        let kind = EventKind::parse(kind.as_ref())?;
        if let Some(missing) = [earlier, later]
            .into_iter()
            .find(|id| self.handler_name(*id).is_none())
        {
            return Err(EventError::UnknownHandler(missing));
        }
        self.table.reorder(&kind, earlier, later)?;
        trace!(%kind, %earlier, %later, "Handlers reordered");
        Ok(())
    }

    /// Handler names registered for `kind`, in dispatch order.
    pub fn handler_order(&self, kind: &EventKind) -> Vec<&str> {
        self.table
            .handlers_for(kind)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.handler_name(*id))
            .collect()
    }

    /// Logs every kind and its handler order at debug level.
    pub fn log_handlers(&self) {
        for kind in self.table.kinds() {
            debug!(%kind, handlers = ?self.handler_order(kind), "Dispatch order");
        }
    }

    pub fn post(&mut self, event: E) {
        self.queues.immediate.push_back(Envelope::broadcast(event));
    }

    pub fn post_after(&mut self, delay: Duration, event: E) -> Result<(), EventError> {
        self.queues.schedule(delay, Envelope::broadcast(event))
    }

    /// Number of events waiting for a future tick.
    pub fn pending_timed(&self) -> usize {
        self.queues.timed.len()
    }

    /// One scheduler pass: pull everything posted from other threads, move
    /// due timed events onto the immediate path, then dispatch until the
    /// immediate queue is empty. Returns the number of events dispatched.
    pub fn run_once(&mut self) -> Result<usize, BusError> {
        self.drain_inbox();
        self.release_due();

        let mut dispatched = 0;
        while let Some(envelope) = self.queues.immediate.pop_front() {
            self.dispatch(envelope)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Runs passes until shut down, then runs the cleanup cascade.
    ///
    /// Between passes the loop waits out the rest of the tick, waking early
    /// when another thread posts.
    pub fn run(&mut self) -> Result<(), BusError> {
        info!(tick = ?self.config.tick, handlers = self.handlers.len(), "Dispatch loop started");
        self.log_handlers();

        while self.running.load(Ordering::Acquire) {
            let started = Instant::now();
            self.run_once()?;
            if let Some(remaining) = self.config.tick.checked_sub(started.elapsed()) {
                self.wait(remaining);
            }
        }

        info!("Dispatch loop stopped");
        self.cleanup.cleanup_all();
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) {
        match self.inbox.recv_timeout(timeout) {
            Ok(inbound) => self.accept(inbound),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // The bus owns a poster, so this only happens while tearing down.
                self.running.store(false, Ordering::Release);
            }
        }
    }

    fn drain_inbox(&mut self) {
        loop {
            match self.inbox.try_recv() {
                Ok(inbound) => self.accept(inbound),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn accept(&mut self, inbound: Inbound<E>) {
        match inbound {
            Inbound::Now(envelope) => self.queues.immediate.push_back(envelope),
            Inbound::At(fire_at, envelope) => self.queues.timed.push(fire_at, envelope),
        }
    }

    fn release_due(&mut self) {
        let now = self.queues.clock.now();
        while let Some((fire_at, envelope)) = self.queues.timed.pop_due(now) {
            let late = now.saturating_sub(fire_at);
            if late > self.config.tolerance {
                warn!(kind = %envelope.event.kind(), ?late, "Timed event running late");
            }
            self.queues.immediate.push_back(envelope);
        }
    }

    fn dispatch(&mut self, envelope: Envelope<E>) -> Result<(), BusError> {
        let kind = envelope.event.kind();
        let started = Instant::now();

        let delivered = match envelope.target {
            Some(target) => {
                if self.handler_name(target).is_none() {
                    warn!(%kind, %target, "Private event for unknown handler dropped");
                    return Ok(());
                }
                self.deliver(target, &envelope.event)?;
                1
            }
            None => {
                let ids = match self.table.handlers_for(&kind) {
                    Some(ids) if !ids.is_empty() => ids.to_vec(),
                    _ => {
                        warn!(%kind, "No handlers registered, event dropped");
                        if let Some(observer) = &self.observer {
                            observer.on_unhandled(&kind);
                        }
                        return Ok(());
                    }
                };
                let mut delivered = 0;
                for id in ids {
                    delivered += 1;
                    if self.deliver(id, &envelope.event)? == Propagation::Stop {
                        trace!(%kind, handler = %id, "Propagation stopped");
                        break;
                    }
                }
                delivered
            }
        };

        if let Some(observer) = &self.observer {
            observer.on_dispatched(&kind, delivered, started.elapsed());
        }
        Ok(())
    }

    fn deliver(&mut self, id: HandlerId, event: &E) -> Result<Propagation, BusError> {
        let handler = &mut self.handlers[id.0];
        let mut ctx = Context {
            queues: &mut self.queues,
            current: id,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event, &mut ctx)));

        match outcome {
            Ok(Ok(propagation)) => Ok(propagation),
            Ok(Err(fault)) => {
                let name = self.handlers[id.0].name().to_owned();
                error!(handler = %name, kind = %event.kind(), %fault, "Handler fault");
                self.halt();
                Err(BusError::HandlerFault {
                    handler: name,
                    fault,
                })
            }
            Err(payload) => {
                error!(handler = self.handlers[id.0].name(), kind = %event.kind(), "Handler panicked");
                self.halt();
                panic::resume_unwind(payload)
            }
        }
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::Release);
        self.cleanup.cleanup_all();
    }

    fn handler_name(&self, id: HandlerId) -> Option<&str> {
        self.handlers.get(id.0).map(|h| h.name())
    }
}
