//! ## vaxel-core::events
//! **Kind-indexed event dispatch**
//!
//! Handlers register for an [`EventKind`]. A posted event is delivered to
//! each handler registered for its kind, in registration order, until one
//! returns [`Propagation::Stop`]. An event addressed to a specific handler
//! (a "private" event) skips the table entirely.
//!
//! ### Key Submodules:
//! - `bus`: the dispatch loop, posting handles and the handler context
//! - `table`: ordered handler lists per kind, with explicit reordering
//! - `timed`: fire-time ordered queue for delayed delivery

pub mod bus;
pub mod table;
pub mod timed;

pub use bus::{Bus, BusConfig, Context, DispatchObserver, Poster, ShutdownHandle};
pub use table::HandlerTable;
pub use timed::TimedQueue;

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Recoverable event bus conditions.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("'{0}' is not a valid event kind")]
    InvalidKind(String),

    #[error("Delay {delay:?} is shorter than one scheduler tick ({tick:?})")]
    TooSoon { delay: Duration, tick: Duration },

    #[error("No handlers registered for event kind '{0}'")]
    UnknownKind(String),

    #[error("{handler} is not registered for event kind '{kind}'")]
    NotRegistered { kind: String, handler: HandlerId },

    #[error("{0} does not exist")]
    UnknownHandler(HandlerId),
}

/// Name of a class of events. Immutable once created.
///
/// Valid kinds start with an ASCII letter and continue with ASCII
/// alphanumerics, `_`, `-` or `.` (e.g. `openflow.packet_in`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(Cow<'static, str>);

impl EventKind {
    /// Kind from a compile-time name. The name is not validated here; use
    /// [`EventKind::is_valid`] in tests for constants.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn parse(name: &str) -> Result<Self, EventError> {
        if Self::is_valid(name) {
            Ok(Self(Cow::Owned(name.to_owned())))
        } else {
            Err(EventError::InvalidKind(name.to_owned()))
        }
    }

    pub fn is_valid(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EventKind {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anything the bus can carry.
///
/// Implementors are expected to be a closed enum; the bus never inspects
/// the concrete type, only the kind tag.
pub trait Event: Send + fmt::Debug + 'static {
    fn kind(&self) -> EventKind;
}

/// Index of a handler owned by a [`Bus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) usize);

impl HandlerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Whether the remaining handlers for a kind should still see the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

/// An unrecoverable failure inside a handler. Returning one from
/// [`Handler::handle`] runs the cleanup cascade and stops the bus.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct HandlerFault {
    pub reason: String,
}

impl HandlerFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A dispatch target.
pub trait Handler<E: Event>: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn handle(&mut self, event: &E, ctx: &mut Context<'_, E>) -> Result<Propagation, HandlerFault>;
}

/// An event together with its optional private target.
#[derive(Debug)]
pub struct Envelope<E> {
    pub event: E,
    pub target: Option<HandlerId>,
}

impl<E> Envelope<E> {
    pub fn broadcast(event: E) -> Self {
        Self {
            event,
            target: None,
        }
    }

    pub fn private(target: HandlerId, event: E) -> Self {
        Self {
            event,
            target: Some(target),
        }
    }
}
