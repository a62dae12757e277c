//! ## vaxel-protocols::flow
//! **Flow entry compiler**
//!
//! A [`FlowEntry`] accumulates a match, a priority, timeouts and an ordered
//! action list, and renders them into the two commands a forwarding
//! decision may need: a rule install (flow-mod) and an immediate emission
//! (packet-out). The entry tracks whether the switch still holds the
//! packet so callers never handle raw buffer ids.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;
use tracing::{trace, warn};

use crate::openflow::{
    append_payload, port, Action, Field, FlowMatch, FlowMod, FlowModCommand, FlowStatsRequest,
    MatchField, PacketOut, ProtocolError, FLOW_PERMANENT, NO_BUFFER,
};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Unknown priority '{0}'")]
    UnknownPriority(String),
}

/// Priority bands. Higher values win.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    Highest,
    Higher,
    High,
    #[default]
    Default,
    Low,
    Lower,
    Lowest,
    Raw(u16),
}

impl Priority {
    pub fn value(self) -> u16 {
        match self {
            Priority::Highest => 0xffff,
            Priority::Higher => 0xc000,
            Priority::High => 0x9000,
            Priority::Default => 0x8000,
            Priority::Low => 0x7000,
            Priority::Lower => 0x4000,
            Priority::Lowest => 0x0000,
            Priority::Raw(v) => v,
        }
    }
}

impl From<u16> for Priority {
    fn from(value: u16) -> Self {
        Priority::Raw(value)
    }
}

impl FromStr for Priority {
    type Err = FlowError;

    /// Accepts a band name (case-insensitive) or a decimal value.
    fn from_str(s: &str) -> Result<Self, FlowError> {
        let name = s.trim().to_ascii_lowercase();
        Ok(match name.as_str() {
            "highest" => Priority::Highest,
            "higher" => Priority::Higher,
            "high" => Priority::High,
            "default" => Priority::Default,
            "low" => Priority::Low,
            "lower" => Priority::Lower,
            "lowest" => Priority::Lowest,
            other => other
                .parse::<u16>()
                .map(Priority::Raw)
                .map_err(|_| FlowError::UnknownPriority(s.to_owned()))?,
        })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Raw(v) => write!(f, "{v}"),
            band => write!(f, "{}", format!("{band:?}").to_ascii_lowercase()),
        }
    }
}

/// Which packet, if any, the switch is holding for this decision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferRef {
    #[default]
    Unbuffered,
    Buffered(u32),
}

impl BufferRef {
    pub fn from_wire(buffer_id: u32) -> Self {
        if buffer_id == NO_BUFFER {
            BufferRef::Unbuffered
        } else {
            BufferRef::Buffered(buffer_id)
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            BufferRef::Unbuffered => NO_BUFFER,
            BufferRef::Buffered(id) => id,
        }
    }
}

/// A rendered packet-out.
///
/// When `requires_payload` is set the switch does not hold the packet and
/// the raw bytes must follow the message; use [`Emission::with_payload`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Emission {
    pub message: Bytes,
    pub requires_payload: bool,
}

impl Emission {
    /// The final wire message: `packet` is appended only when required.
    ///
    /// Fails if the packet would push the message past the largest length
    /// a header can carry.
    pub fn with_payload(self, packet: &[u8]) -> Result<Bytes, ProtocolError> {
        if self.requires_payload {
            append_payload(self.message, packet)
        } else {
            Ok(self.message)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowEntry {
    pub matching: FlowMatch,
    pub priority: Priority,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
    pub flags: u16,
    actions: Vec<Action>,
    buffer: BufferRef,
}

impl Default for FlowEntry {
    fn default() -> Self {
        Self::new(FlowMatch::all())
    }
}

impl FlowEntry {
    pub fn new(matching: FlowMatch) -> Self {
        Self {
            matching,
            priority: Priority::Default,
            idle_timeout: FLOW_PERMANENT,
            hard_timeout: FLOW_PERMANENT,
            cookie: 0,
            flags: 0,
            actions: Vec::new(),
            buffer: BufferRef::Unbuffered,
        }
    }

    pub fn set_field(&mut self, value: MatchField) -> &mut Self {
        self.matching.set(value);
        self
    }

    /// Appends to the action list. Duplicates are kept and all execute.
    pub fn add_action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }

    /// `Buffered(NO_BUFFER)` is stored as [`BufferRef::Unbuffered`].
    pub fn set_buffer(&mut self, buffer: BufferRef) -> &mut Self {
        self.buffer = BufferRef::from_wire(buffer.to_wire());
        self
    }

    pub fn set_priority(&mut self, priority: impl Into<Priority>) -> &mut Self {
        self.priority = priority.into();
        self
    }

    /// Resolves `name` to a priority band. Unknown names leave the entry
    /// unchanged.
    pub fn set_priority_name(&mut self, name: &str) -> Result<&mut Self, FlowError> {
        match name.parse::<Priority>() {
            Ok(priority) => {
                self.priority = priority;
                Ok(self)
            }
            Err(e) => {
                warn!(name, "Unknown flow priority");
                Err(e)
            }
        }
    }

    pub fn set_timeouts(&mut self, idle: u16, hard: u16) -> &mut Self {
        self.idle_timeout = idle;
        self.hard_timeout = hard;
        self
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn buffer(&self) -> BufferRef {
        self.buffer
    }

    pub fn to_flow_mod(&self, command: FlowModCommand) -> FlowMod {
        FlowMod {
            matching: self.matching,
            cookie: self.cookie,
            command,
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            priority: self.priority.value(),
            buffer_id: self.buffer.to_wire(),
            out_port: port::NONE,
            flags: self.flags,
            actions: self.actions.clone(),
        }
    }

    /// Rule-install command.
    pub fn render_install(&self, command: FlowModCommand, xid: u32) -> Bytes {
        trace!(?command, xid, matching = ?self.matching, "Rendering flow-mod");
        self.to_flow_mod(command).encode(xid)
    }

    /// Packet-out for the packet this decision is about.
    ///
    /// The packet is referenced by buffer id unless the entry is unbuffered
    /// or `force_unbuffered` is set, in which case the caller must append
    /// the raw packet.
    pub fn render_emit(&self, force_unbuffered: bool, xid: u32) -> Emission {
        let buffer_id = if force_unbuffered {
            NO_BUFFER
        } else {
            self.buffer.to_wire()
        };
        let in_port = if self.matching.is_exact(Field::InPort) {
            self.matching.in_port
        } else {
            port::NONE
        };
        let message = PacketOut {
            buffer_id,
            in_port,
            actions: self.actions.clone(),
            data: Bytes::new(),
        }
        .encode(xid);
        Emission {
            message,
            requires_payload: buffer_id == NO_BUFFER,
        }
    }

    /// Statistics request covering this entry's match.
    pub fn render_stats_request(&self, xid: u32) -> Bytes {
        FlowStatsRequest::new(self.matching).encode(xid)
    }

    /// Entry matching the opposite direction of this flow, arriving on
    /// `in_port`.
    ///
    /// Source and destination swap at each layer; non-directional fields
    /// that are set carry over; everything else is wildcarded. Priority
    /// and timeouts are kept, actions are not.
    pub fn reverse(&self, in_port: u16) -> FlowEntry {
        let src = &self.matching;
        let mut m = FlowMatch::all();
        m.set(MatchField::InPort(in_port));

        for field in [
            Field::DlVlan,
            Field::DlVlanPcp,
            Field::DlType,
            Field::NwTos,
            Field::NwProto,
        ] {
            if let Some(value) = src.get(field) {
                m.set(value);
            }
        }

        if src.is_exact(Field::DlSrc) {
            m.set(MatchField::DlDst(src.dl_src));
        }
        if src.is_exact(Field::DlDst) {
            m.set(MatchField::DlSrc(src.dl_dst));
        }
        if src.is_exact(Field::NwSrc) {
            m.set(MatchField::NwDst(src.nw_src));
        }
        if src.is_exact(Field::NwDst) {
            m.set(MatchField::NwSrc(src.nw_dst));
        }
        if src.is_exact(Field::TpSrc) {
            m.set(MatchField::TpDst(src.tp_src));
        }
        if src.is_exact(Field::TpDst) {
            m.set(MatchField::TpSrc(src.tp_dst));
        }

        FlowEntry {
            matching: m,
            priority: self.priority,
            idle_timeout: self.idle_timeout,
            hard_timeout: self.hard_timeout,
            ..FlowEntry::default()
        }
    }

    /// Whether `other` matches the reverse direction of this entry.
    ///
    /// Link, network and transport layers are checked independently:
    /// wildcard state must mirror, and concrete values must be swapped.
    pub fn is_reverse_of(&self, other: &FlowEntry) -> bool {
        let (a, b) = (&self.matching, &other.matching);
        mirrored(a, b, Field::DlSrc, Field::DlDst)
            && mirrored(a, b, Field::NwSrc, Field::NwDst)
            && mirrored(a, b, Field::TpSrc, Field::TpDst)
    }
}

fn mirrored(a: &FlowMatch, b: &FlowMatch, src: Field, dst: Field) -> bool {
    let crossed = |x: Field, y: Field| match (a.get(x), b.get(y)) {
        (None, None) => true,
        (Some(lhs), Some(rhs)) => same_value(lhs, rhs),
        _ => false,
    };
    crossed(src, dst) && crossed(dst, src)
}

fn same_value(lhs: MatchField, rhs: MatchField) -> bool {
    use MatchField::*;
    match (lhs, rhs) {
        (DlSrc(x) | DlDst(x), DlSrc(y) | DlDst(y)) => x == y,
        (NwSrc(x) | NwDst(x), NwSrc(y) | NwDst(y)) => x == y,
        (TpSrc(x) | TpDst(x), TpSrc(y) | TpDst(y)) => x == y,
        _ => false,
    }
}
