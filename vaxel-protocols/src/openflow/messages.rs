//! Typed message bodies.
//!
//! Decoders take a complete message (header included) as produced by the
//! framer. Bytes left over after the known fields are reported with a
//! warning and otherwise ignored.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use super::actions::{actions_len, parse_actions, write_actions, Action};
use super::matching::{FlowMatch, MacAddr, MATCH_LEN};
use super::{
    begin, body, ensure, expect_type, finish, port, try_finish, MessageType, ProtocolError,
    HEADER_LEN, NO_BUFFER,
};

pub const PHY_PORT_LEN: usize = 48;
pub const FEATURES_REPLY_LEN: usize = 32;
pub const PACKET_IN_LEN: usize = 18;
pub const FLOW_REMOVED_LEN: usize = 88;
pub const PORT_STATUS_LEN: usize = 64;
pub const ERROR_LEN: usize = 12;
pub const SWITCH_CONFIG_LEN: usize = 12;
pub const STATS_HEADER_LEN: usize = 12;
pub const FLOW_STATS_LEN: usize = 88;
pub const AGGREGATE_STATS_LEN: usize = 24;
pub const FLOW_STATS_REQUEST_LEN: usize = 44;
pub const PACKET_OUT_LEN: usize = 16;
pub const FLOW_MOD_LEN: usize = 72;

pub mod stats_type {
    pub const DESC: u16 = 0;
    pub const FLOW: u16 = 1;
    pub const AGGREGATE: u16 = 2;
    pub const TABLE: u16 = 3;
    pub const PORT: u16 = 4;
    pub const QUEUE: u16 = 5;
    pub const VENDOR: u16 = 0xffff;
}

pub mod flow_mod_flags {
    pub const SEND_FLOW_REM: u16 = 1 << 0;
    pub const CHECK_OVERLAP: u16 = 1 << 1;
    pub const EMERG: u16 = 1 << 2;
}

fn warn_trailing(message: MessageType, remaining: usize) {
    if remaining > 0 {
        warn!(?message, remaining, "Message is of irregular length");
    }
}

fn mac(buf: &mut &[u8]) -> MacAddr {
    let mut out = [0u8; 6];
    buf.copy_to_slice(&mut out);
    MacAddr(out)
}

pub fn hello(xid: u32) -> Bytes {
    finish(begin(MessageType::Hello, xid, 0))
}

pub fn features_request(xid: u32) -> Bytes {
    finish(begin(MessageType::FeaturesRequest, xid, 0))
}

pub fn echo_request(xid: u32, payload: &[u8]) -> Bytes {
    let mut buf = begin(MessageType::EchoRequest, xid, payload.len());
    buf.put_slice(payload);
    finish(buf)
}

/// Keepalive answer carrying the request's transaction id and payload.
pub fn echo_reply(xid: u32, payload: &[u8]) -> Bytes {
    let mut buf = begin(MessageType::EchoReply, xid, payload.len());
    buf.put_slice(payload);
    finish(buf)
}

pub fn get_config_request(xid: u32) -> Bytes {
    finish(begin(MessageType::GetConfigRequest, xid, 0))
}

pub fn barrier_request(xid: u32) -> Bytes {
    finish(begin(MessageType::BarrierRequest, xid, 0))
}

/// Physical port description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhyPort {
    pub port_no: u16,
    pub hw_addr: MacAddr,
    pub name: String,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
}

impl PhyPort {
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure(data, PHY_PORT_LEN)?;
        let mut buf = &data[..PHY_PORT_LEN];
        let port_no = buf.get_u16();
        let hw_addr = mac(&mut buf);
        let raw_name = &buf[..16];
        let end = raw_name.iter().position(|b| *b == 0).unwrap_or(16);
        let name = String::from_utf8_lossy(&raw_name[..end]).into_owned();
        buf.advance(16);
        Ok(Self {
            port_no,
            hw_addr,
            name,
            config: buf.get_u32(),
            state: buf.get_u32(),
            curr: buf.get_u32(),
            advertised: buf.get_u32(),
            supported: buf.get_u32(),
            peer: buf.get_u32(),
        })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.port_no);
        buf.put_slice(&self.hw_addr.0);
        let mut name = [0u8; 16];
        let bytes = self.name.as_bytes();
        let n = bytes.len().min(15);
        name[..n].copy_from_slice(&bytes[..n]);
        buf.put_slice(&name);
        for field in [
            self.config,
            self.state,
            self.curr,
            self.advertised,
            self.supported,
            self.peer,
        ] {
            buf.put_u32(field);
        }
    }
}

/// Reply to a features request; completes the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub capabilities: u32,
    pub actions: u32,
    pub ports: Vec<PhyPort>,
}

impl SwitchFeatures {
    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::FeaturesReply)?;
        ensure(message, FEATURES_REPLY_LEN)?;
        let mut buf = body(message, &header);
        ensure(buf, FEATURES_REPLY_LEN - HEADER_LEN)?;

        let datapath_id = buf.get_u64();
        let n_buffers = buf.get_u32();
        let n_tables = buf.get_u8();
        buf.advance(3);
        let capabilities = buf.get_u32();
        let actions = buf.get_u32();

        let mut ports = Vec::with_capacity(buf.len() / PHY_PORT_LEN);
        while buf.len() >= PHY_PORT_LEN {
            ports.push(PhyPort::parse(buf)?);
            buf.advance(PHY_PORT_LEN);
        }
        warn_trailing(MessageType::FeaturesReply, buf.len());

        Ok(Self {
            datapath_id,
            n_buffers,
            n_tables,
            capabilities,
            actions,
            ports,
        })
    }

    pub fn encode(&self, xid: u32) -> Bytes {
        let mut buf = begin(
            MessageType::FeaturesReply,
            xid,
            FEATURES_REPLY_LEN + self.ports.len() * PHY_PORT_LEN,
        );
        buf.put_u64(self.datapath_id);
        buf.put_u32(self.n_buffers);
        buf.put_u8(self.n_tables);
        buf.put_bytes(0, 3);
        buf.put_u32(self.capabilities);
        buf.put_u32(self.actions);
        for p in &self.ports {
            p.write(&mut buf);
        }
        finish(buf)
    }
}

/// A packet the switch could not match, or was told to send up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: u16,
    pub reason: u8,
    pub data: Bytes,
}

impl PacketIn {
    pub const REASON_NO_MATCH: u8 = 0;
    pub const REASON_ACTION: u8 = 1;

    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::PacketIn)?;
        ensure(message, PACKET_IN_LEN)?;
        let end = (header.length as usize).clamp(PACKET_IN_LEN, message.len());
        let mut buf = &message[HEADER_LEN..PACKET_IN_LEN];
        Ok(Self {
            buffer_id: buf.get_u32(),
            total_len: buf.get_u16(),
            in_port: buf.get_u16(),
            reason: buf.get_u8(),
            data: message.slice(PACKET_IN_LEN..end),
        })
    }

    pub fn is_buffered(&self) -> bool {
        self.buffer_id != NO_BUFFER
    }

    pub fn encode(&self, xid: u32) -> Bytes {
        let mut buf = begin(MessageType::PacketIn, xid, PACKET_IN_LEN + self.data.len());
        buf.put_u32(self.buffer_id);
        buf.put_u16(self.total_len);
        buf.put_u16(self.in_port);
        buf.put_u8(self.reason);
        buf.put_u8(0);
        buf.put_slice(&self.data);
        finish(buf)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRemoved {
    pub matching: FlowMatch,
    pub cookie: u64,
    pub priority: u16,
    pub reason: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: u16,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl FlowRemoved {
    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::FlowRemoved)?;
        let mut buf = body(message, &header);
        ensure(buf, FLOW_REMOVED_LEN - HEADER_LEN)?;

        let matching = FlowMatch::parse(buf)?;
        buf.advance(MATCH_LEN);
        let cookie = buf.get_u64();
        let priority = buf.get_u16();
        let reason = buf.get_u8();
        buf.advance(1);
        let duration_sec = buf.get_u32();
        let duration_nsec = buf.get_u32();
        let idle_timeout = buf.get_u16();
        buf.advance(2);
        let packet_count = buf.get_u64();
        let byte_count = buf.get_u64();
        warn_trailing(MessageType::FlowRemoved, buf.len());

        Ok(Self {
            matching,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count,
            byte_count,
        })
    }

    pub fn encode(&self, xid: u32) -> Bytes {
        let mut buf = begin(MessageType::FlowRemoved, xid, FLOW_REMOVED_LEN);
        self.matching.write(&mut buf);
        buf.put_u64(self.cookie);
        buf.put_u16(self.priority);
        buf.put_u8(self.reason);
        buf.put_u8(0);
        buf.put_u32(self.duration_sec);
        buf.put_u32(self.duration_nsec);
        buf.put_u16(self.idle_timeout);
        buf.put_bytes(0, 2);
        buf.put_u64(self.packet_count);
        buf.put_u64(self.byte_count);
        finish(buf)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: u8,
    pub desc: PhyPort,
}

impl PortStatus {
    pub const REASON_ADD: u8 = 0;
    pub const REASON_DELETE: u8 = 1;
    pub const REASON_MODIFY: u8 = 2;

    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::PortStatus)?;
        let mut buf = body(message, &header);
        ensure(buf, PORT_STATUS_LEN - HEADER_LEN)?;

        let reason = buf.get_u8();
        buf.advance(7);
        let desc = PhyPort::parse(buf)?;
        warn_trailing(MessageType::PortStatus, buf.len() - PHY_PORT_LEN);
        Ok(Self { reason, desc })
    }

    pub fn encode(&self, xid: u32) -> Bytes {
        let mut buf = begin(MessageType::PortStatus, xid, PORT_STATUS_LEN);
        buf.put_u8(self.reason);
        buf.put_bytes(0, 7);
        self.desc.write(&mut buf);
        finish(buf)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Bytes,
}

impl ErrorMsg {
    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::Error)?;
        ensure(message, ERROR_LEN)?;
        let end = (header.length as usize).clamp(ERROR_LEN, message.len());
        let mut buf = &message[HEADER_LEN..ERROR_LEN];
        Ok(Self {
            err_type: buf.get_u16(),
            code: buf.get_u16(),
            data: message.slice(ERROR_LEN..end),
        })
    }

    pub fn encode(&self, xid: u32) -> Bytes {
        let mut buf = begin(MessageType::Error, xid, ERROR_LEN + self.data.len());
        buf.put_u16(self.err_type);
        buf.put_u16(self.code);
        buf.put_slice(&self.data);
        finish(buf)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl SwitchConfig {
    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::GetConfigReply)?;
        let mut buf = body(message, &header);
        ensure(buf, SWITCH_CONFIG_LEN - HEADER_LEN)?;
        let config = Self {
            flags: buf.get_u16(),
            miss_send_len: buf.get_u16(),
        };
        warn_trailing(MessageType::GetConfigReply, buf.len());
        Ok(config)
    }

    fn encode_as(&self, msg_type: MessageType, xid: u32) -> Bytes {
        let mut buf = begin(msg_type, xid, SWITCH_CONFIG_LEN);
        buf.put_u16(self.flags);
        buf.put_u16(self.miss_send_len);
        finish(buf)
    }

    pub fn encode_set(&self, xid: u32) -> Bytes {
        self.encode_as(MessageType::SetConfig, xid)
    }

    pub fn encode_reply(&self, xid: u32) -> Bytes {
        self.encode_as(MessageType::GetConfigReply, xid)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowStats {
    pub table_id: u8,
    pub matching: FlowMatch,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub actions: Vec<Action>,
}

impl FlowStats {
    fn parse(record: &[u8]) -> Result<Self, ProtocolError> {
        let mut buf = record;
        buf.advance(2);
        let table_id = buf.get_u8();
        buf.advance(1);
        let matching = FlowMatch::parse(buf)?;
        buf.advance(MATCH_LEN);
        let duration_sec = buf.get_u32();
        let duration_nsec = buf.get_u32();
        let priority = buf.get_u16();
        let idle_timeout = buf.get_u16();
        let hard_timeout = buf.get_u16();
        buf.advance(6);
        let cookie = buf.get_u64();
        let packet_count = buf.get_u64();
        let byte_count = buf.get_u64();
        let actions = match parse_actions(buf) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, "Flow statistics record has malformed actions");
                Vec::new()
            }
        };
        Ok(Self {
            table_id,
            matching,
            duration_sec,
            duration_nsec,
            priority,
            idle_timeout,
            hard_timeout,
            cookie,
            packet_count,
            byte_count,
            actions,
        })
    }

    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u16((FLOW_STATS_LEN + actions_len(&self.actions)) as u16);
        buf.put_u8(self.table_id);
        buf.put_u8(0);
        self.matching.write(buf);
        buf.put_u32(self.duration_sec);
        buf.put_u32(self.duration_nsec);
        buf.put_u16(self.priority);
        buf.put_u16(self.idle_timeout);
        buf.put_u16(self.hard_timeout);
        buf.put_bytes(0, 6);
        buf.put_u64(self.cookie);
        buf.put_u64(self.packet_count);
        buf.put_u64(self.byte_count);
        write_actions(&self.actions, buf);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatsBody {
    Flow(Vec<FlowStats>),
    Aggregate(AggregateStats),
    /// Subtypes delivered without decoding.
    Raw(Bytes),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsReply {
    pub stats_type: u16,
    pub flags: u16,
    pub body: StatsBody,
}

impl StatsReply {
    pub const FLAG_MORE: u16 = 1;

    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::StatsReply)?;
        ensure(message, STATS_HEADER_LEN)?;
        let end = (header.length as usize).clamp(STATS_HEADER_LEN, message.len());
        let mut prefix = &message[HEADER_LEN..STATS_HEADER_LEN];
        let stats_type = prefix.get_u16();
        let flags = prefix.get_u16();
        let rest = &message[STATS_HEADER_LEN..end];

        let body = match stats_type {
            stats_type::FLOW => StatsBody::Flow(Self::parse_flows(rest)),
            stats_type::AGGREGATE => {
                ensure(rest, AGGREGATE_STATS_LEN)?;
                let mut buf = rest;
                let stats = AggregateStats {
                    packet_count: buf.get_u64(),
                    byte_count: buf.get_u64(),
                    flow_count: buf.get_u32(),
                };
                warn_trailing(MessageType::StatsReply, rest.len() - AGGREGATE_STATS_LEN);
                StatsBody::Aggregate(stats)
            }
            _ => StatsBody::Raw(message.slice(STATS_HEADER_LEN..end)),
        };

        Ok(Self {
            stats_type,
            flags,
            body,
        })
    }

    /// Splits a flow statistics body into records. Decoding stops at the
    /// first record whose length does not fit; the records before it are
    /// still returned.
    fn parse_flows(mut rest: &[u8]) -> Vec<FlowStats> {
        let mut records = Vec::new();
        while rest.len() >= FLOW_STATS_LEN {
            let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            if len < FLOW_STATS_LEN || len > rest.len() {
                break;
            }
            match FlowStats::parse(&rest[..len]) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping flow statistics record"),
            }
            rest = &rest[len..];
        }
        warn_trailing(MessageType::StatsReply, rest.len());
        records
    }

    pub fn encode(&self, xid: u32) -> Bytes {
        let mut buf = begin(MessageType::StatsReply, xid, STATS_HEADER_LEN);
        buf.put_u16(self.stats_type);
        buf.put_u16(self.flags);
        match &self.body {
            StatsBody::Flow(records) => {
                for record in records {
                    record.write(&mut buf);
                }
            }
            StatsBody::Aggregate(stats) => {
                buf.put_u64(stats.packet_count);
                buf.put_u64(stats.byte_count);
                buf.put_u32(stats.flow_count);
                buf.put_bytes(0, 4);
            }
            StatsBody::Raw(raw) => buf.put_slice(raw),
        }
        finish(buf)
    }
}

/// Request for per-flow or aggregate statistics over a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowStatsRequest {
    pub matching: FlowMatch,
    pub table_id: u8,
    pub out_port: u16,
}

impl FlowStatsRequest {
    pub const ALL_TABLES: u8 = 0xff;

    pub fn new(matching: FlowMatch) -> Self {
        Self {
            matching,
            table_id: Self::ALL_TABLES,
            out_port: port::NONE,
        }
    }

    fn encode_as(&self, kind: u16, xid: u32) -> Bytes {
        let mut buf = begin(MessageType::StatsRequest, xid, 4 + FLOW_STATS_REQUEST_LEN);
        buf.put_u16(kind);
        buf.put_u16(0);
        self.matching.write(&mut buf);
        buf.put_u8(self.table_id);
        buf.put_u8(0);
        buf.put_u16(self.out_port);
        finish(buf)
    }

    pub fn encode(&self, xid: u32) -> Bytes {
        self.encode_as(stats_type::FLOW, xid)
    }

    pub fn encode_aggregate(&self, xid: u32) -> Bytes {
        self.encode_as(stats_type::AGGREGATE, xid)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum FlowModCommand {
    Add = 0,
    Modify = 1,
    ModifyStrict = 2,
    Delete = 3,
    DeleteStrict = 4,
}

impl TryFrom<u16> for FlowModCommand {
    type Error = ProtocolError;

    fn try_from(code: u16) -> Result<Self, ProtocolError> {
        Ok(match code {
            0 => FlowModCommand::Add,
            1 => FlowModCommand::Modify,
            2 => FlowModCommand::ModifyStrict,
            3 => FlowModCommand::Delete,
            4 => FlowModCommand::DeleteStrict,
            _ => return Err(ProtocolError::BadPacket("unknown flow-mod command")),
        })
    }
}

/// Rule install, modify or delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowMod {
    pub matching: FlowMatch,
    pub cookie: u64,
    pub command: FlowModCommand,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: u16,
    pub flags: u16,
    pub actions: Vec<Action>,
}

impl FlowMod {
    pub fn encode(&self, xid: u32) -> Bytes {
        let mut buf = begin(
            MessageType::FlowMod,
            xid,
            FLOW_MOD_LEN + actions_len(&self.actions),
        );
        self.matching.write(&mut buf);
        buf.put_u64(self.cookie);
        buf.put_u16(self.command as u16);
        buf.put_u16(self.idle_timeout);
        buf.put_u16(self.hard_timeout);
        buf.put_u16(self.priority);
        buf.put_u32(self.buffer_id);
        buf.put_u16(self.out_port);
        buf.put_u16(self.flags);
        write_actions(&self.actions, &mut buf);
        finish(buf)
    }

    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::FlowMod)?;
        let mut buf = body(message, &header);
        ensure(buf, FLOW_MOD_LEN - HEADER_LEN)?;

        let matching = FlowMatch::parse(buf)?;
        buf.advance(MATCH_LEN);
        Ok(Self {
            matching,
            cookie: buf.get_u64(),
            command: FlowModCommand::try_from(buf.get_u16())?,
            idle_timeout: buf.get_u16(),
            hard_timeout: buf.get_u16(),
            priority: buf.get_u16(),
            buffer_id: buf.get_u32(),
            out_port: buf.get_u16(),
            flags: buf.get_u16(),
            actions: parse_actions(buf)?,
        })
    }
}

/// Immediate packet emission. `data` is empty when the switch holds the
/// packet in `buffer_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: u16,
    pub actions: Vec<Action>,
    pub data: Bytes,
}

impl PacketOut {
    pub fn encode(&self, xid: u32) -> Bytes {
        let actions_len = actions_len(&self.actions);
        let mut buf = begin(
            MessageType::PacketOut,
            xid,
            PACKET_OUT_LEN + actions_len + self.data.len(),
        );
        buf.put_u32(self.buffer_id);
        buf.put_u16(self.in_port);
        buf.put_u16(actions_len as u16);
        write_actions(&self.actions, &mut buf);
        buf.put_slice(&self.data);
        finish(buf)
    }

    pub fn parse(message: &Bytes) -> Result<Self, ProtocolError> {
        let header = expect_type(message, MessageType::PacketOut)?;
        ensure(message, PACKET_OUT_LEN)?;
        let end = (header.length as usize).clamp(PACKET_OUT_LEN, message.len());
        let mut buf = &message[HEADER_LEN..PACKET_OUT_LEN];
        let buffer_id = buf.get_u32();
        let in_port = buf.get_u16();
        let actions_len = buf.get_u16() as usize;

        let actions_end = PACKET_OUT_LEN + actions_len;
        if actions_end > end {
            return Err(ProtocolError::Truncated {
                needed: actions_end,
                available: end,
            });
        }
        Ok(Self {
            buffer_id,
            in_port,
            actions: parse_actions(&message[PACKET_OUT_LEN..actions_end])?,
            data: message.slice(actions_end..end),
        })
    }
}

/// Appends raw packet bytes to an encoded message and restamps its length.
///
/// Fails when the result no longer fits an OpenFlow header.
pub fn append_payload(message: Bytes, payload: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(message.len() + payload.len());
    buf.put_slice(&message);
    buf.put_slice(payload);
    try_finish(buf)
}
