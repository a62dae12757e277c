use thiserror::Error;
use vaxel_core::events::EventError;

#[derive(Debug, Error)]
pub enum ForwardingError {
    #[error("Unknown forwarding policy '{0}'")]
    UnknownPolicy(String),

    #[error("Unknown flow action '{0}'")]
    UnknownAction(String),

    #[error("Handler ordering failed: {0}")]
    Ordering(#[from] EventError),
}
