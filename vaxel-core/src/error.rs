use thiserror::Error;

use crate::events::{EventError, HandlerFault};

/// Conditions that stop the dispatch loop.
#[derive(Debug, Error)]
pub enum BusError {
    /// A handler reported an unrecoverable fault. The cleanup cascade has
    /// already run when this is returned.
    #[error("Handler '{handler}' faulted: {fault}")]
    HandlerFault {
        handler: String,
        #[source]
        fault: HandlerFault,
    },

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}
