//! Dispatch loop parameters.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Event bus timing.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct CoreConfig {
    /// Scheduler tick in milliseconds. Timed events must be at least one
    /// tick in the future.
    #[serde(default = "default_tick_ms")]
    #[validate(range(min = 1, max = 1000))]
    pub tick_ms: u64,

    /// How late a timed event may be dispatched before a warning is logged.
    #[serde(default = "default_tolerance_ms")]
    #[validate(range(max = 60000))]
    pub tolerance_ms: u64,
}

fn default_tick_ms() -> u64 {
    100
}

fn default_tolerance_ms() -> u64 {
    100
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            tolerance_ms: default_tolerance_ms(),
        }
    }
}
