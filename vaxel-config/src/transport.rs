//! Listening endpoints and per-connection I/O limits.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct TransportConfig {
    /// Switch listener, `host:port`.
    #[serde(default = "default_openflow_addr")]
    #[validate(custom(function = validation::validate_socket_addr))]
    pub openflow_addr: String,

    /// Local control socket. Disabled when absent.
    #[serde(default = "default_control_socket")]
    pub control_socket: Option<PathBuf>,

    /// Remove a stale socket file before binding the control socket.
    #[serde(default = "default_true")]
    pub force_unlink: bool,

    /// Upper bound on bytes taken from a socket per read.
    #[serde(default = "default_read_chunk")]
    #[validate(range(min = 64, max = 65536))]
    pub read_chunk: usize,

    /// Outbound messages queued per connection before sends are dropped.
    #[serde(default = "default_send_queue_depth")]
    #[validate(range(min = 1, max = 65536))]
    pub send_queue_depth: usize,

    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,
}

fn default_openflow_addr() -> String {
    "0.0.0.0:6633".into()
}

fn default_control_socket() -> Option<PathBuf> {
    Some(PathBuf::from("vaxel.sock"))
}

fn default_true() -> bool {
    true
}

fn default_read_chunk() -> usize {
    2048
}

fn default_send_queue_depth() -> usize {
    256
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            openflow_addr: default_openflow_addr(),
            control_socket: default_control_socket(),
            force_unlink: default_true(),
            read_chunk: default_read_chunk(),
            send_queue_depth: default_send_queue_depth(),
            tcp_nodelay: default_true(),
        }
    }
}
