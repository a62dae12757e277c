//! vaxel-transport
//!
//! Transport multiplexer for the controller. A single I/O thread owns every
//! socket: it accepts switch and control connections, reads bounded chunks
//! and hands them to a per-connection [`StreamCodec`]. Writes go through a
//! bounded per-connection queue so the dispatch loop never blocks on a
//! slow peer.

pub mod error;
pub mod link;
pub mod multiplexer;
pub mod table;

pub use error::{SendError, TransportError};
pub use link::{ConnId, Link, StreamCodec};
pub use multiplexer::{
    BindSpec, CodecFactory, Endpoint, Listener, Multiplexer, TransportCleanup, TransportConfig,
};
pub use table::ConnectionTable;
