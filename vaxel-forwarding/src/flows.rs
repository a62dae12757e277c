//! ## vaxel-forwarding::flows
//! **Pre-formed flow entries**
//!
//! Coarse entries typically installed as defaults when a switch connects.
//! Each one is permanent, carries a single output action chosen by
//! [`FlowAction`] (or none, to drop) and sits in a low priority band so
//! that exact rules installed later take precedence.

use std::str::FromStr;

use vaxel_protocols::openflow::{Action, FlowMatch, MatchField, DEFAULT_MISS_SEND_LEN};
use vaxel_protocols::packet::{
    ETH_TYPE_ARP, ETH_TYPE_IP, IP_PROTO_ICMP, IP_PROTO_IGMP, IP_PROTO_TCP, IP_PROTO_UDP,
};
use vaxel_protocols::{FlowEntry, Priority};

use crate::ForwardingError;

pub const UDP_BOOTPS: u16 = 67;
pub const UDP_BOOTPC: u16 = 68;
pub const UDP_SUNRPC: u16 = 111;
pub const UDP_NETBIOS: u16 = 137;
pub const UDP_NETBIOS_DGM: u16 = 138;
pub const UDP_MS_LICENSE: u16 = 2223;
pub const UDP_MDNS: u16 = 5353;

/// What a pre-formed entry does with matching packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    Drop,
    /// Send the first [`DEFAULT_MISS_SEND_LEN`] bytes to the controller.
    ToController,
    Flood,
}

impl FlowAction {
    fn action(self) -> Option<Action> {
        match self {
            FlowAction::Drop => None,
            FlowAction::ToController => Some(Action::to_controller(DEFAULT_MISS_SEND_LEN)),
            FlowAction::Flood => Some(Action::flood()),
        }
    }
}

impl FromStr for FlowAction {
    type Err = ForwardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(FlowAction::Drop),
            "controller" => Ok(FlowAction::ToController),
            "flood" => Ok(FlowAction::Flood),
            _ => Err(ForwardingError::UnknownAction(s.to_owned())),
        }
    }
}

fn entry(action: FlowAction, priority: Priority, fields: &[MatchField]) -> FlowEntry {
    let mut entry = FlowEntry::new(FlowMatch::all());
    entry.set_priority(priority);
    for field in fields {
        entry.set_field(*field);
    }
    if let Some(action) = action.action() {
        entry.add_action(action);
    }
    entry
}

/// Every packet.
pub fn all(action: FlowAction) -> FlowEntry {
    entry(action, Priority::Lowest, &[])
}

pub fn ethertype(action: FlowAction, ethertype: u16) -> FlowEntry {
    entry(action, Priority::Low, &[MatchField::DlType(ethertype)])
}

pub fn arp(action: FlowAction) -> FlowEntry {
    ethertype(action, ETH_TYPE_ARP)
}

/// IPv4 packets carrying protocol `ip_proto`.
pub fn ip_proto(action: FlowAction, ip_proto: u8) -> FlowEntry {
    entry(
        action,
        Priority::Low,
        &[MatchField::DlType(ETH_TYPE_IP), MatchField::NwProto(ip_proto)],
    )
}

pub fn icmp(action: FlowAction) -> FlowEntry {
    ip_proto(action, IP_PROTO_ICMP)
}

pub fn igmp(action: FlowAction) -> FlowEntry {
    ip_proto(action, IP_PROTO_IGMP)
}

fn transport(action: FlowAction, proto: u8, dst_port: Option<u16>) -> FlowEntry {
    let mut entry = ip_proto(action, proto);
    if let Some(port) = dst_port {
        entry.set_field(MatchField::TpDst(port));
    }
    entry
}

/// UDP, optionally only to `dst_port`.
pub fn udp(action: FlowAction, dst_port: Option<u16>) -> FlowEntry {
    transport(action, IP_PROTO_UDP, dst_port)
}

/// TCP, optionally only to `dst_port`.
pub fn tcp(action: FlowAction, dst_port: Option<u16>) -> FlowEntry {
    transport(action, IP_PROTO_TCP, dst_port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaxel_protocols::openflow::{port, Field, FLOW_PERMANENT};

    #[test]
    fn match_all_is_lowest_and_fully_wildcarded() {
        let e = all(FlowAction::Flood);
        assert_eq!(e.priority, Priority::Lowest);
        assert!(Field::ALL.iter().all(|f| e.matching.is_wildcarded(*f)));
        assert_eq!(e.actions(), &[Action::flood()]);
        assert_eq!((e.idle_timeout, e.hard_timeout), (FLOW_PERMANENT, FLOW_PERMANENT));
    }

    #[test]
    fn drop_entries_have_no_actions() {
        assert!(arp(FlowAction::Drop).actions().is_empty());
        assert!(all(FlowAction::Drop).actions().is_empty());
    }

    #[test]
    fn udp_port_entry_matches_only_its_fields() {
        let e = udp(FlowAction::ToController, Some(UDP_BOOTPS));
        let exact = e.matching.exact_fields();
        assert_eq!(
            exact,
            vec![
                MatchField::DlType(ETH_TYPE_IP),
                MatchField::NwProto(IP_PROTO_UDP),
                MatchField::TpDst(UDP_BOOTPS),
            ]
        );
        assert_eq!(e.priority, Priority::Low);
        assert_eq!(
            e.actions(),
            &[Action::Output {
                port: port::CONTROLLER,
                max_len: DEFAULT_MISS_SEND_LEN
            }]
        );
    }

    #[test]
    fn tcp_without_port_leaves_transport_wildcarded() {
        let e = tcp(FlowAction::Flood, None);
        assert!(e.matching.is_exact(Field::NwProto));
        assert!(e.matching.is_wildcarded(Field::TpDst));
        assert_eq!(e.matching.nw_proto, IP_PROTO_TCP);
    }

    #[test]
    fn actions_parse_from_names() {
        assert_eq!("controller".parse::<FlowAction>().unwrap(), FlowAction::ToController);
        assert_eq!("Flood".parse::<FlowAction>().unwrap(), FlowAction::Flood);
        assert!(matches!(
            "mirror".parse::<FlowAction>(),
            Err(ForwardingError::UnknownAction(a)) if a == "mirror"
        ));
    }

    #[test]
    fn icmp_and_igmp_use_their_protocols() {
        assert_eq!(icmp(FlowAction::Drop).matching.nw_proto, IP_PROTO_ICMP);
        assert_eq!(igmp(FlowAction::Drop).matching.nw_proto, IP_PROTO_IGMP);
    }
}
