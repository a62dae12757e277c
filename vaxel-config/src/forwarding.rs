//! Table-miss policy selection and the rules pushed to every new switch.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct ForwardingConfig {
    /// One of `flood`, `drop` or `learning`.
    #[serde(default = "default_policy")]
    #[validate(custom(function = validation::validate_policy))]
    pub policy: String,

    /// Idle timeout in seconds for rules installed by the miss policy.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u16,

    /// Install a rule in addition to emitting the packet.
    #[serde(default = "default_true")]
    pub install_flows: bool,

    /// Seconds before a learned host is forgotten. `0` keeps hosts until
    /// their switch disconnects.
    #[serde(default = "default_mac_aging_secs")]
    #[validate(range(max = 86400))]
    pub mac_aging_secs: u64,

    /// Rules installed on each switch once its handshake completes.
    #[serde(default)]
    #[validate(nested)]
    pub default_entries: Vec<DefaultEntryConfig>,
}

/// One pre-formed rule.
///
/// ```yaml
/// default_entries:
///   - kind: udp
///     action: controller
///     port: 67
///   - kind: all
///     action: drop
/// ```
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_default_entry))]
pub struct DefaultEntryConfig {
    /// `all`, `ethertype`, `arp`, `ip_proto`, `icmp`, `igmp`, `udp` or `tcp`.
    #[validate(custom(function = validation::validate_entry_kind))]
    pub kind: String,

    /// `drop`, `controller` or `flood`.
    #[validate(custom(function = validation::validate_entry_action))]
    pub action: String,

    /// Priority band name or a raw value. Each kind has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = validation::validate_priority))]
    pub priority: Option<String>,

    /// Required for `ethertype`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ethertype: Option<u16>,

    /// Required for `ip_proto`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_proto: Option<u8>,

    /// Destination port for `udp` and `tcp`; all ports when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

fn default_policy() -> String {
    "learning".into()
}

fn default_idle_timeout() -> u16 {
    5
}

fn default_true() -> bool {
    true
}

fn default_mac_aging_secs() -> u64 {
    300
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            idle_timeout: default_idle_timeout(),
            install_flows: default_true(),
            mac_aging_secs: default_mac_aging_secs(),
            default_entries: Vec::new(),
        }
    }
}
