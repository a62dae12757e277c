//! # vaxel-core
//!
//! Foundation layer for event dispatch and orderly shutdown.
//!
//! ### Key Submodules:
//! - `events`: kind-indexed handler dispatch with immediate and timed delivery
//! - `cleanup`: reverse-registration cleanup cascade
//! - `time`: wall and virtual clocks driving the scheduler tick
//!
//! The bus is generic over the event type. Crates built on top define a
//! single sealed event enum and implement [`events::Event`] for it.

pub mod cleanup;
pub mod error;
pub mod events;
pub mod time;

pub mod prelude {
    pub use crate::cleanup::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::time::*;
}

pub use error::BusError;
