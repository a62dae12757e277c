//! Decoding of post-handshake switch messages into controller events.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};
use vaxel_protocols::openflow::{
    ErrorMsg, FlowMatch, FlowRemoved, Header, MatchField, MessageType, PacketIn, PortStatus,
    ProtocolError, StatsReply, SwitchConfig, SwitchFeatures,
};
use vaxel_transport::ConnId;

use crate::events::{ControllerEvent, PacketInEvent, Switched};

/// Builds the event for one complete message from switch `dpid`.
///
/// Returns `Ok(None)` for message types that produce no event; unknown
/// type codes are logged and dropped the same way.
pub fn parse_message(
    conn: ConnId,
    dpid: u64,
    message: &Bytes,
) -> Result<Option<ControllerEvent>, ProtocolError> {
    let header = Header::parse(message)?;
    let msg_type = match header.message_type() {
        Ok(t) => t,
        Err(_) => {
            warn!(%conn, code = header.msg_type, "Unknown message type, dropped");
            return Ok(None);
        }
    };
    let xid = header.xid;

    let event = match msg_type {
        MessageType::PacketIn => {
            let packet = PacketIn::parse(message)?;
            let matching = packet_match(&packet);
            let event = PacketInEvent { packet, matching };
            ControllerEvent::PacketIn(Switched::new(conn, dpid, xid, event))
        }
        MessageType::FlowRemoved => {
            let removed = FlowRemoved::parse(message)?;
            ControllerEvent::FlowRemoved(Switched::new(conn, dpid, xid, removed))
        }
        MessageType::PortStatus => {
            let status = PortStatus::parse(message)?;
            ControllerEvent::PortStatus(Switched::new(conn, dpid, xid, status))
        }
        MessageType::Error => {
            let error = ErrorMsg::parse(message)?;
            ControllerEvent::Error(Switched::new(conn, dpid, xid, error))
        }
        MessageType::GetConfigReply => {
            let config = SwitchConfig::parse(message)?;
            ControllerEvent::ConfigReply(Switched::new(conn, dpid, xid, config))
        }
        MessageType::StatsReply => {
            let reply = StatsReply::parse(message)?;
            ControllerEvent::StatsReply(Switched::new(conn, dpid, xid, reply))
        }
        MessageType::FeaturesReply => {
            let features = Arc::new(SwitchFeatures::parse(message)?);
            ControllerEvent::FeaturesReply(Switched::new(conn, dpid, xid, features))
        }
        other => {
            debug!(%conn, ?other, xid, "No event for message type");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

fn packet_match(packet: &PacketIn) -> FlowMatch {
    FlowMatch::from_packet(packet.in_port, &packet.data).unwrap_or_else(|e| {
        debug!(error = %e, "Packet too short for a full match");
        let mut m = FlowMatch::all();
        m.set(MatchField::InPort(packet.in_port));
        m
    })
}
