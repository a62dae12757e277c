//! # Vaxel Protocols
//!
//! Wire formats spoken by the controller:
//!
//! - [`openflow`]: OpenFlow 1.0 message encoding and decoding
//! - [`framing`]: length-prefixed stream reassembly
//! - [`flow`]: compiling forwarding decisions into flow-mod and packet-out
//! - [`packet`]: exact-match extraction from raw frames
//! - [`control`]: JSON document framing for the local control socket

pub mod control;
pub mod flow;
pub mod framing;
pub mod openflow;
pub mod packet;

pub use flow::{BufferRef, Emission, FlowEntry, FlowError, Priority};
pub use framing::{Framer, LengthPrefix, OpenFlowFramer};
pub use openflow::{Header, MessageType, ProtocolError};
