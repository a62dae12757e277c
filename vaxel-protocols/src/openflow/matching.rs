//! The OpenFlow 1.0 match structure.
//!
//! Each field is either wildcarded (value ignored) or exact. The network
//! addresses carry a 6-bit "ignored low bits" count in the wildcard word
//! instead of a single flag; any count of 32 or more wildcards the field.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use bytes::BufMut;

use super::{ensure, ProtocolError};

pub const MATCH_LEN: usize = 40;

pub mod wildcards {
    pub const IN_PORT: u32 = 1 << 0;
    pub const DL_VLAN: u32 = 1 << 1;
    pub const DL_SRC: u32 = 1 << 2;
    pub const DL_DST: u32 = 1 << 3;
    pub const DL_TYPE: u32 = 1 << 4;
    pub const NW_PROTO: u32 = 1 << 5;
    pub const TP_SRC: u32 = 1 << 6;
    pub const TP_DST: u32 = 1 << 7;
    pub const NW_SRC_SHIFT: u32 = 8;
    pub const NW_SRC_MASK: u32 = 0x3f << NW_SRC_SHIFT;
    pub const NW_DST_SHIFT: u32 = 14;
    pub const NW_DST_MASK: u32 = 0x3f << NW_DST_SHIFT;
    pub const DL_VLAN_PCP: u32 = 1 << 20;
    pub const NW_TOS: u32 = 1 << 21;
    pub const ALL: u32 = (1 << 22) - 1;
}

/// VLAN id carried by untagged frames in an exact match.
pub const VLAN_NONE: u16 = 0xffff;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for MacAddr {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, ProtocolError> {
        let digits: String = s.split(':').collect();
        let mut out = [0u8; 6];
        hex::decode_to_slice(&digits, &mut out)
            .map_err(|_| ProtocolError::BadPacket("invalid MAC address"))?;
        Ok(MacAddr(out))
    }
}

/// Match field identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    InPort,
    DlSrc,
    DlDst,
    DlVlan,
    DlVlanPcp,
    DlType,
    NwTos,
    NwProto,
    NwSrc,
    NwDst,
    TpSrc,
    TpDst,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::InPort,
        Field::DlSrc,
        Field::DlDst,
        Field::DlVlan,
        Field::DlVlanPcp,
        Field::DlType,
        Field::NwTos,
        Field::NwProto,
        Field::NwSrc,
        Field::NwDst,
        Field::TpSrc,
        Field::TpDst,
    ];

    fn flag(self) -> u32 {
        use wildcards::*;
        match self {
            Field::InPort => IN_PORT,
            Field::DlSrc => DL_SRC,
            Field::DlDst => DL_DST,
            Field::DlVlan => DL_VLAN,
            Field::DlVlanPcp => DL_VLAN_PCP,
            Field::DlType => DL_TYPE,
            Field::NwTos => NW_TOS,
            Field::NwProto => NW_PROTO,
            Field::NwSrc => NW_SRC_MASK,
            Field::NwDst => NW_DST_MASK,
            Field::TpSrc => TP_SRC,
            Field::TpDst => TP_DST,
        }
    }
}

/// A field together with its exact value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchField {
    InPort(u16),
    DlSrc(MacAddr),
    DlDst(MacAddr),
    DlVlan(u16),
    DlVlanPcp(u8),
    DlType(u16),
    NwTos(u8),
    NwProto(u8),
    NwSrc(Ipv4Addr),
    NwDst(Ipv4Addr),
    TpSrc(u16),
    TpDst(u16),
}

impl MatchField {
    pub fn field(&self) -> Field {
        match self {
            MatchField::InPort(_) => Field::InPort,
            MatchField::DlSrc(_) => Field::DlSrc,
            MatchField::DlDst(_) => Field::DlDst,
            MatchField::DlVlan(_) => Field::DlVlan,
            MatchField::DlVlanPcp(_) => Field::DlVlanPcp,
            MatchField::DlType(_) => Field::DlType,
            MatchField::NwTos(_) => Field::NwTos,
            MatchField::NwProto(_) => Field::NwProto,
            MatchField::NwSrc(_) => Field::NwSrc,
            MatchField::NwDst(_) => Field::NwDst,
            MatchField::TpSrc(_) => Field::TpSrc,
            MatchField::TpDst(_) => Field::TpDst,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub wildcards: u32,
    pub in_port: u16,
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_vlan: u16,
    pub dl_vlan_pcp: u8,
    pub dl_type: u16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub nw_src: Ipv4Addr,
    pub nw_dst: Ipv4Addr,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Default for FlowMatch {
    fn default() -> Self {
        Self::all()
    }
}

impl FlowMatch {
    /// Matches every packet.
    pub fn all() -> Self {
        Self {
            wildcards: wildcards::ALL,
            in_port: 0,
            dl_src: MacAddr::default(),
            dl_dst: MacAddr::default(),
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: Ipv4Addr::UNSPECIFIED,
            nw_dst: Ipv4Addr::UNSPECIFIED,
            tp_src: 0,
            tp_dst: 0,
        }
    }

    pub fn is_wildcarded(&self, field: Field) -> bool {
        match field {
            Field::NwSrc => {
                (self.wildcards & wildcards::NW_SRC_MASK) >> wildcards::NW_SRC_SHIFT >= 32
            }
            Field::NwDst => {
                (self.wildcards & wildcards::NW_DST_MASK) >> wildcards::NW_DST_SHIFT >= 32
            }
            other => self.wildcards & other.flag() != 0,
        }
    }

    pub fn is_exact(&self, field: Field) -> bool {
        !self.is_wildcarded(field)
    }

    /// Clears the field's wildcard and stores its value. Setting an exact
    /// field again overwrites the value.
    pub fn set(&mut self, value: MatchField) -> &mut Self {
        self.wildcards &= !value.field().flag();
        match value {
            MatchField::InPort(v) => self.in_port = v,
            MatchField::DlSrc(v) => self.dl_src = v,
            MatchField::DlDst(v) => self.dl_dst = v,
            MatchField::DlVlan(v) => self.dl_vlan = v,
            MatchField::DlVlanPcp(v) => self.dl_vlan_pcp = v,
            MatchField::DlType(v) => self.dl_type = v,
            MatchField::NwTos(v) => self.nw_tos = v,
            MatchField::NwProto(v) => self.nw_proto = v,
            MatchField::NwSrc(v) => self.nw_src = v,
            MatchField::NwDst(v) => self.nw_dst = v,
            MatchField::TpSrc(v) => self.tp_src = v,
            MatchField::TpDst(v) => self.tp_dst = v,
        }
        self
    }

    /// Wildcards `field` and zeroes its stored value.
    pub fn wildcard(&mut self, field: Field) -> &mut Self {
        self.wildcards |= field.flag();
        match field {
            Field::InPort => self.in_port = 0,
            Field::DlSrc => self.dl_src = MacAddr::default(),
            Field::DlDst => self.dl_dst = MacAddr::default(),
            Field::DlVlan => self.dl_vlan = 0,
            Field::DlVlanPcp => self.dl_vlan_pcp = 0,
            Field::DlType => self.dl_type = 0,
            Field::NwTos => self.nw_tos = 0,
            Field::NwProto => self.nw_proto = 0,
            Field::NwSrc => self.nw_src = Ipv4Addr::UNSPECIFIED,
            Field::NwDst => self.nw_dst = Ipv4Addr::UNSPECIFIED,
            Field::TpSrc => self.tp_src = 0,
            Field::TpDst => self.tp_dst = 0,
        }
        self
    }

    /// The exact value of `field`, or `None` if it is wildcarded.
    pub fn get(&self, field: Field) -> Option<MatchField> {
        if self.is_wildcarded(field) {
            return None;
        }
        Some(match field {
            Field::InPort => MatchField::InPort(self.in_port),
            Field::DlSrc => MatchField::DlSrc(self.dl_src),
            Field::DlDst => MatchField::DlDst(self.dl_dst),
            Field::DlVlan => MatchField::DlVlan(self.dl_vlan),
            Field::DlVlanPcp => MatchField::DlVlanPcp(self.dl_vlan_pcp),
            Field::DlType => MatchField::DlType(self.dl_type),
            Field::NwTos => MatchField::NwTos(self.nw_tos),
            Field::NwProto => MatchField::NwProto(self.nw_proto),
            Field::NwSrc => MatchField::NwSrc(self.nw_src),
            Field::NwDst => MatchField::NwDst(self.nw_dst),
            Field::TpSrc => MatchField::TpSrc(self.tp_src),
            Field::TpDst => MatchField::TpDst(self.tp_dst),
        })
    }

    /// Exact fields in declaration order.
    pub fn exact_fields(&self) -> Vec<MatchField> {
        Field::ALL.iter().filter_map(|f| self.get(*f)).collect()
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.wildcards);
        buf.put_u16(self.in_port);
        buf.put_slice(&self.dl_src.0);
        buf.put_slice(&self.dl_dst.0);
        buf.put_u16(self.dl_vlan);
        buf.put_u8(self.dl_vlan_pcp);
        buf.put_u8(0);
        buf.put_u16(self.dl_type);
        buf.put_u8(self.nw_tos);
        buf.put_u8(self.nw_proto);
        buf.put_bytes(0, 2);
        buf.put_slice(&self.nw_src.octets());
        buf.put_slice(&self.nw_dst.octets());
        buf.put_u16(self.tp_src);
        buf.put_u16(self.tp_dst);
    }

    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure(data, MATCH_LEN)?;
        let u16_at = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let ipv4_at = |i: usize| Ipv4Addr::new(data[i], data[i + 1], data[i + 2], data[i + 3]);
        let mac_at = |i: usize| {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&data[i..i + 6]);
            MacAddr(mac)
        };
        Ok(Self {
            wildcards: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            in_port: u16_at(4),
            dl_src: mac_at(6),
            dl_dst: mac_at(12),
            dl_vlan: u16_at(18),
            dl_vlan_pcp: data[20],
            dl_type: u16_at(22),
            nw_tos: data[24],
            nw_proto: data[25],
            nw_src: ipv4_at(28),
            nw_dst: ipv4_at(32),
            tp_src: u16_at(36),
            tp_dst: u16_at(38),
        })
    }
}

impl fmt::Debug for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_struct("FlowMatch");
        for field in self.exact_fields() {
            match field {
                MatchField::InPort(v) => list.field("in_port", &v),
                MatchField::DlSrc(v) => list.field("dl_src", &v),
                MatchField::DlDst(v) => list.field("dl_dst", &v),
                MatchField::DlVlan(v) => list.field("dl_vlan", &v),
                MatchField::DlVlanPcp(v) => list.field("dl_vlan_pcp", &v),
                MatchField::DlType(v) => list.field("dl_type", &format_args!("{v:#06x}")),
                MatchField::NwTos(v) => list.field("nw_tos", &v),
                MatchField::NwProto(v) => list.field("nw_proto", &v),
                MatchField::NwSrc(v) => list.field("nw_src", &v),
                MatchField::NwDst(v) => list.field("nw_dst", &v),
                MatchField::TpSrc(v) => list.field("tp_src", &v),
                MatchField::TpDst(v) => list.field("tp_dst", &v),
            };
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn all_wildcards_every_field() {
        let m = FlowMatch::all();
        assert!(Field::ALL.iter().all(|f| m.is_wildcarded(*f)));
        assert!(m.exact_fields().is_empty());
    }

    #[test]
    fn set_clears_only_its_wildcard() {
        let mut m = FlowMatch::all();
        m.set(MatchField::NwSrc(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(m.is_exact(Field::NwSrc));
        assert!(m.is_wildcarded(Field::NwDst));
        assert_eq!(
            m.wildcards,
            wildcards::ALL & !wildcards::NW_SRC_MASK,
        );

        m.set(MatchField::NwSrc(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(m.get(Field::NwSrc), Some(MatchField::NwSrc(Ipv4Addr::new(10, 0, 0, 2))));

        m.wildcard(Field::NwSrc);
        assert_eq!(m, FlowMatch::all());
    }

    #[test]
    fn wire_layout_is_forty_bytes() {
        let mut m = FlowMatch::all();
        m.set(MatchField::InPort(3))
            .set(MatchField::DlType(0x0800))
            .set(MatchField::NwDst(Ipv4Addr::new(192, 168, 1, 9)))
            .set(MatchField::TpDst(443));

        let mut buf = BytesMut::new();
        m.write(&mut buf);
        assert_eq!(buf.len(), MATCH_LEN);
        assert_eq!(&buf[4..6], &[0, 3]);
        assert_eq!(&buf[22..24], &[0x08, 0x00]);
        assert_eq!(&buf[32..36], &[192, 168, 1, 9]);
        assert_eq!(&buf[38..40], &[0x01, 0xbb]);
        assert_eq!(FlowMatch::parse(&buf).unwrap(), m);
    }

    #[test]
    fn mac_addresses_parse_and_print() {
        let mac: MacAddr = "00:1b:21:3a:4f:90".parse().unwrap();
        assert_eq!(mac.to_string(), "00:1b:21:3a:4f:90");
        assert!(!mac.is_multicast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!("00:1b".parse::<MacAddr>().is_err());
    }
}
