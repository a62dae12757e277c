//! ## vaxel-protocols::openflow
//! **OpenFlow 1.0 wire codec**
//!
//! Every message starts with an 8-byte header (version, type, total length,
//! transaction id). All multi-byte integers are big-endian.
//!
//! ### Key Submodules:
//! - `matching`: the 40-byte wildcarded match
//! - `actions`: action list encoding and decoding
//! - `messages`: typed message bodies, both directions

pub mod actions;
pub mod matching;
pub mod messages;

pub use actions::Action;
pub use matching::{Field, FlowMatch, MacAddr, MatchField};
pub use messages::*;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

pub const OFP_VERSION: u8 = 0x01;
pub const HEADER_LEN: usize = 8;
/// Largest message the header's length field can describe.
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

/// Buffer id meaning "the switch holds no copy of the packet".
pub const NO_BUFFER: u32 = 0xffff_ffff;
pub const DEFAULT_MISS_SEND_LEN: u16 = 128;
/// Timeout value for flows that never expire.
pub const FLOW_PERMANENT: u16 = 0;

/// Reserved port numbers.
pub mod port {
    pub const MAX: u16 = 0xff00;
    pub const IN_PORT: u16 = 0xfff8;
    pub const TABLE: u16 = 0xfff9;
    pub const NORMAL: u16 = 0xfffa;
    pub const FLOOD: u16 = 0xfffb;
    pub const ALL: u16 = 0xfffc;
    pub const CONTROLLER: u16 = 0xfffd;
    pub const LOCAL: u16 = 0xfffe;
    pub const NONE: u16 = 0xffff;
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Declared length {declared} is shorter than the {minimum}-byte minimum")]
    BadLength { declared: usize, minimum: usize },

    #[error("Expected a {expected:?} message, found type code {found}")]
    UnexpectedType { expected: MessageType, found: u8 },

    #[error("Unknown message type code {0}")]
    UnknownType(u8),

    #[error("Malformed action at offset {offset}: {reason}")]
    BadAction { offset: usize, reason: &'static str },

    #[error("Malformed packet: {0}")]
    BadPacket(&'static str),

    #[error("Message of {length} bytes does not fit the 16-bit length field")]
    TooLong { length: usize },
}

pub(crate) fn ensure(data: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if data.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Vendor = 4,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    PortMod = 15,
    StatsRequest = 16,
    StatsReply = 17,
    BarrierRequest = 18,
    BarrierReply = 19,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, ProtocolError> {
        use MessageType::*;
        Ok(match code {
            0 => Hello,
            1 => Error,
            2 => EchoRequest,
            3 => EchoReply,
            4 => Vendor,
            5 => FeaturesRequest,
            6 => FeaturesReply,
            7 => GetConfigRequest,
            8 => GetConfigReply,
            9 => SetConfig,
            10 => PacketIn,
            11 => FlowRemoved,
            12 => PortStatus,
            13 => PacketOut,
            14 => FlowMod,
            15 => PortMod,
            16 => StatsRequest,
            17 => StatsReply,
            18 => BarrierRequest,
            19 => BarrierReply,
            other => return Err(ProtocolError::UnknownType(other)),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub msg_type: u8,
    pub length: u16,
    pub xid: u32,
}

impl Header {
    pub fn new(msg_type: MessageType, xid: u32) -> Self {
        Self {
            version: OFP_VERSION,
            msg_type: msg_type as u8,
            length: HEADER_LEN as u16,
            xid,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure(data, HEADER_LEN)?;
        Ok(Self {
            version: data[0],
            msg_type: data[1],
            length: u16::from_be_bytes([data[2], data[3]]),
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }

    pub fn message_type(&self) -> Result<MessageType, ProtocolError> {
        MessageType::try_from(self.msg_type)
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.msg_type);
        buf.put_u16(self.length);
        buf.put_u32(self.xid);
    }
}

/// Overwrites the header's length field with the actual message length.
///
/// Fails if `message` is shorter than a header.
pub fn stamp_length(message: &mut [u8]) -> Result<(), ProtocolError> {
    ensure(message, HEADER_LEN)?;
    let length = u16::try_from(message.len()).map_err(|_| ProtocolError::TooLong {
        length: message.len(),
    })?;
    message[2..4].copy_from_slice(&length.to_be_bytes());
    Ok(())
}

/// Starts a message of the given type with a placeholder length.
pub(crate) fn begin(msg_type: MessageType, xid: u32, body_hint: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body_hint);
    Header::new(msg_type, xid).write(&mut buf);
    buf
}

/// Stamps the final length and freezes the message.
///
/// Only for encoders whose output is bounded by their own fields; anything
/// carrying caller-supplied bytes goes through [`try_finish`].
pub(crate) fn finish(buf: BytesMut) -> Bytes {
    debug_assert!(
        buf.len() <= MAX_MESSAGE_LEN,
        "encoded message of {} bytes overflows the length field",
        buf.len()
    );
    let length = buf.len() as u16;
    stamp(buf, length)
}

/// Like [`finish`], but fails instead of producing a header whose length
/// disagrees with the message.
pub(crate) fn try_finish(buf: BytesMut) -> Result<Bytes, ProtocolError> {
    let length =
        u16::try_from(buf.len()).map_err(|_| ProtocolError::TooLong { length: buf.len() })?;
    Ok(stamp(buf, length))
}

fn stamp(mut buf: BytesMut, length: u16) -> Bytes {
    buf[2..4].copy_from_slice(&length.to_be_bytes());
    buf.freeze()
}

/// Checks that `message` carries the expected type code and returns its
/// header.
pub(crate) fn expect_type(message: &[u8], expected: MessageType) -> Result<Header, ProtocolError> {
    let header = Header::parse(message)?;
    if header.msg_type != expected as u8 {
        return Err(ProtocolError::UnexpectedType {
            expected,
            found: header.msg_type,
        });
    }
    Ok(header)
}

/// Slice of `message` covered by its declared length, after the header.
pub(crate) fn body<'a>(message: &'a [u8], header: &Header) -> &'a [u8] {
    let end = (header.length as usize).min(message.len()).max(HEADER_LEN);
    &message[HEADER_LEN..end]
}
