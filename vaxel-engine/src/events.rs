//! The controller's event vocabulary.
//!
//! One closed enum carries everything the dispatch loop handles. Handlers
//! register by kind name and match on the variant.

use std::sync::Arc;

use serde_json::Value;
use vaxel_core::events::{Event, EventKind};
use vaxel_protocols::openflow::{
    ErrorMsg, FlowMatch, FlowRemoved, PacketIn, PortStatus, StatsReply, SwitchConfig,
    SwitchFeatures,
};
use vaxel_transport::ConnId;

/// Kind names for [`ControllerEvent`] variants.
pub mod kinds {
    pub const CONNECTION_OPENED: &str = "connection.opened";
    pub const CONNECTION_CLOSED: &str = "connection.closed";
    pub const FEATURES_REPLY: &str = "openflow.features_reply";
    pub const PACKET_IN: &str = "openflow.packet_in";
    pub const FLOW_REMOVED: &str = "openflow.flow_removed";
    pub const PORT_STATUS: &str = "openflow.port_status";
    pub const ERROR: &str = "openflow.error";
    pub const CONFIG_REPLY: &str = "openflow.config_reply";
    pub const STATS_REPLY: &str = "openflow.stats_reply";
    pub const CONTROL_MESSAGE: &str = "control.message";
    pub const TIMER: &str = "timer";

    pub const ALL: [&str; 11] = [
        CONNECTION_OPENED,
        CONNECTION_CLOSED,
        FEATURES_REPLY,
        PACKET_IN,
        FLOW_REMOVED,
        PORT_STATUS,
        ERROR,
        CONFIG_REPLY,
        STATS_REPLY,
        CONTROL_MESSAGE,
        TIMER,
    ];
}

/// A decoded message together with the switch it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Switched<T> {
    pub conn: ConnId,
    pub dpid: u64,
    pub xid: u32,
    pub message: T,
}

impl<T> Switched<T> {
    pub fn new(conn: ConnId, dpid: u64, xid: u32, message: T) -> Self {
        Self {
            conn,
            dpid,
            xid,
            message,
        }
    }
}

/// A packet-in and the exact match computed from its payload.
#[derive(Clone, Debug, PartialEq)]
pub struct PacketInEvent {
    pub packet: PacketIn,
    pub matching: FlowMatch,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ControllerEvent {
    ConnectionOpened { conn: ConnId, peer: String },
    /// `dpid` is set when the connection had completed its handshake.
    ConnectionClosed { conn: ConnId, dpid: Option<u64> },
    FeaturesReply(Switched<Arc<SwitchFeatures>>),
    PacketIn(Switched<PacketInEvent>),
    FlowRemoved(Switched<FlowRemoved>),
    PortStatus(Switched<PortStatus>),
    Error(Switched<ErrorMsg>),
    ConfigReply(Switched<SwitchConfig>),
    StatsReply(Switched<StatsReply>),
    /// One complete document from the local control socket.
    ControlMessage { conn: ConnId, document: Value },
    /// Scheduled callback; usually posted privately to its owner.
    Timer { tag: u64 },
}

impl Event for ControllerEvent {
    fn kind(&self) -> EventKind {
        EventKind::from_static(match self {
            ControllerEvent::ConnectionOpened { .. } => kinds::CONNECTION_OPENED,
            ControllerEvent::ConnectionClosed { .. } => kinds::CONNECTION_CLOSED,
            ControllerEvent::FeaturesReply(_) => kinds::FEATURES_REPLY,
            ControllerEvent::PacketIn(_) => kinds::PACKET_IN,
            ControllerEvent::FlowRemoved(_) => kinds::FLOW_REMOVED,
            ControllerEvent::PortStatus(_) => kinds::PORT_STATUS,
            ControllerEvent::Error(_) => kinds::ERROR,
            ControllerEvent::ConfigReply(_) => kinds::CONFIG_REPLY,
            ControllerEvent::StatsReply(_) => kinds::STATS_REPLY,
            ControllerEvent::ControlMessage { .. } => kinds::CONTROL_MESSAGE,
            ControllerEvent::Timer { .. } => kinds::TIMER,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_valid() {
        for kind in kinds::ALL {
            assert!(EventKind::is_valid(kind), "{kind}");
        }
    }

    #[test]
    fn variants_map_to_their_kind() {
        let closed = ControllerEvent::ConnectionClosed {
            conn: ConnId(3),
            dpid: None,
        };
        assert_eq!(closed.kind().as_str(), kinds::CONNECTION_CLOSED);
        assert_eq!(ControllerEvent::Timer { tag: 1 }.kind().as_str(), kinds::TIMER);
    }
}
