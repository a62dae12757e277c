//! # Vaxel Engine
//!
//! The controller runtime: everything between raw switch connections and
//! the policy components.
//!
//! ## Key Modules:
//! - `session`: per-switch handshake, keepalive and message decoding
//! - `parser`: OpenFlow message to controller event translation
//! - `events`: the [`ControllerEvent`] vocabulary and its kind names
//! - `services`: shared service context (metrics, xids, switch registry)
//! - `control`: local control channel sessions
//! - `controller`: runtime assembly and the blocking run loop

pub mod control;
pub mod controller;
pub mod error;
pub mod events;
pub mod parser;
pub mod services;
pub mod session;

#[cfg(test)]
mod testing;

pub use controller::{Controller, ControllerConfig};
pub use error::EngineError;
pub use events::{kinds, ControllerEvent, PacketInEvent, Switched};
pub use services::{Services, SwitchHandle, SwitchRegistry, XidGenerator};
pub use session::{SessionConfig, SessionState, SwitchSession};
