//! # Vaxel Forwarding
//!
//! Policy components built on the controller event contract: they consume
//! packet-in, features-reply and connection events and answer with flow
//! rules and packet-outs.
//!
//! ## Key Modules:
//! - `flows`: pre-formed coarse flow entries
//! - `miss`: flood-on-miss and drop-on-miss
//! - `learning`: MAC learning switch
//! - `defaults`: entries installed when a switch connects

pub mod defaults;
pub mod error;
pub mod flows;
pub mod learning;
pub mod miss;

#[cfg(test)]
mod testing;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;
use vaxel_core::events::HandlerId;
use vaxel_engine::{kinds, Controller};
use vaxel_protocols::FlowEntry;

pub use defaults::DefaultEntries;
pub use error::ForwardingError;
pub use flows::FlowAction;
pub use learning::LearningSwitch;
pub use miss::{DropOnMiss, FloodOnMiss};

/// How packets the switches have no rule for are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Flood,
    Drop,
    /// Learning switch, flooding unknown destinations.
    Learning,
}

impl FromStr for Policy {
    type Err = ForwardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flood" => Ok(Policy::Flood),
            "drop" => Ok(Policy::Drop),
            "learning" => Ok(Policy::Learning),
            _ => Err(ForwardingError::UnknownPolicy(s.to_owned())),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::Flood => "flood",
            Policy::Drop => "drop",
            Policy::Learning => "learning",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ForwardingOptions {
    /// Idle timeout, in seconds, of rules installed for missed packets.
    pub idle_timeout: u16,
    /// Install a rule in addition to emitting the packet.
    pub install_flows: bool,
    /// How long a learned host is remembered without being seen.
    pub mac_aging: Option<Duration>,
    /// Installed on every switch when its handshake completes.
    pub default_entries: Vec<FlowEntry>,
}

impl Default for ForwardingOptions {
    fn default() -> Self {
        Self {
            idle_timeout: 5,
            install_flows: true,
            mac_aging: Some(Duration::from_secs(300)),
            default_entries: Vec::new(),
        }
    }
}

/// Adds the components for `policy` to `controller`. Returns their ids in
/// packet-in dispatch order.
pub fn install(
    controller: &mut Controller,
    policy: Policy,
    options: ForwardingOptions,
) -> Result<Vec<HandlerId>, ForwardingError> {
    let services = controller.services();
    let mut ids = Vec::new();

    if !options.default_entries.is_empty() {
        let mut defaults = DefaultEntries::new(services.clone());
        for entry in &options.default_entries {
            defaults.add(entry.clone());
        }
        let id = controller.add_handler(defaults);
        controller.register(kinds::FEATURES_REPLY, id);
        ids.push(id);
    }

    match policy {
        Policy::Flood => {
            let id = controller.add_handler(FloodOnMiss::new(services, options));
            controller.register(kinds::PACKET_IN, id);
            ids.push(id);
        }
        Policy::Drop => {
            let id = controller.add_handler(DropOnMiss::new(services, options));
            controller.register(kinds::PACKET_IN, id);
            ids.push(id);
        }
        Policy::Learning => {
            let flood = controller.add_handler(FloodOnMiss::new(services.clone(), options.clone()));
            let learning = controller.add_handler(LearningSwitch::new(services, options));
            controller.register(kinds::PACKET_IN, flood);
            for kind in [
                kinds::PACKET_IN,
                kinds::FEATURES_REPLY,
                kinds::CONNECTION_CLOSED,
            ] {
                controller.register(kind, learning);
            }
            // Learning must see packets first so it can stop known flows.
            controller
                .bus_mut()
                .reorder(kinds::PACKET_IN, learning, flood)?;
            ids.extend([learning, flood]);
        }
    }

    info!(%policy, handlers = ids.len(), "Forwarding policy installed");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names() {
        assert_eq!("Learning".parse::<Policy>().unwrap(), Policy::Learning);
        assert_eq!("flood".parse::<Policy>().unwrap().to_string(), "flood");
        assert!(matches!(
            "bridge".parse::<Policy>(),
            Err(ForwardingError::UnknownPolicy(_))
        ));
    }
}
