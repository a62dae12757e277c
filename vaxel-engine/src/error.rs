use std::net::AddrParseError;

use thiserror::Error;
use vaxel_core::BusError;
use vaxel_transport::TransportError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid listen address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}
