//! Switch session behaviour after the handshake.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct SessionConfig {
    /// Bytes of each unmatched packet the switch should send to the
    /// controller.
    #[serde(default = "default_miss_send_len")]
    #[validate(range(min = 0, max = 65535))]
    pub miss_send_len: u32,

    /// Ask the switch for its configuration once it is ready.
    #[serde(default)]
    pub request_config: bool,
}

fn default_miss_send_len() -> u32 {
    128
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            miss_send_len: default_miss_send_len(),
            request_config: false,
        }
    }
}
