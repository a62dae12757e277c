//! Exact match extraction from raw Ethernet frames.
//!
//! Every field is set; fields a layer does not carry are zero. `dl_type`
//! is the outermost EtherType, so an 802.1Q frame matches on `0x8100`
//! while the VLAN id and priority come from the tag.

use std::net::Ipv4Addr;

use crate::openflow::matching::VLAN_NONE;
use crate::openflow::{FlowMatch, MacAddr, ProtocolError};

pub const ETH_TYPE_IP: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;
pub const ETH_TYPE_VLAN: u16 = 0x8100;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_IGMP: u8 = 2;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

fn u16_at(data: &[u8], i: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(i)?, *data.get(i + 1)?]))
}

fn ipv4_at(data: &[u8], i: usize) -> Option<Ipv4Addr> {
    let b = data.get(i..i + 4)?;
    Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
}

impl FlowMatch {
    /// Builds the exact match a switch would compute for `frame` arriving
    /// on `in_port`. Truncated inner headers leave their fields zero.
    pub fn from_packet(in_port: u16, frame: &[u8]) -> Result<Self, ProtocolError> {
        if frame.len() < ETH_HEADER_LEN {
            return Err(ProtocolError::BadPacket("frame shorter than an Ethernet header"));
        }

        let mut m = FlowMatch {
            wildcards: 0,
            in_port,
            dl_vlan: VLAN_NONE,
            ..FlowMatch::all()
        };

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&frame[0..6]);
        src.copy_from_slice(&frame[6..12]);
        m.dl_dst = MacAddr(dst);
        m.dl_src = MacAddr(src);
        m.dl_type = u16::from_be_bytes([frame[12], frame[13]]);

        let mut inner_type = m.dl_type;
        let mut offset = ETH_HEADER_LEN;
        if m.dl_type == ETH_TYPE_VLAN {
            if let (Some(tag), Some(ty)) = (u16_at(frame, 14), u16_at(frame, 16)) {
                m.dl_vlan = tag & 0x0fff;
                m.dl_vlan_pcp = (tag >> 13) as u8;
                inner_type = ty;
                offset += VLAN_TAG_LEN;
            }
        }

        let payload = &frame[offset..];
        match inner_type {
            ETH_TYPE_IP => extract_ipv4(&mut m, payload),
            ETH_TYPE_ARP => extract_arp(&mut m, payload),
            _ => {}
        }
        Ok(m)
    }
}

fn extract_arp(m: &mut FlowMatch, arp: &[u8]) {
    if let (Some(op), Some(spa), Some(tpa)) = (u16_at(arp, 6), ipv4_at(arp, 14), ipv4_at(arp, 24)) {
        m.nw_proto = op as u8;
        m.nw_src = spa;
        m.nw_dst = tpa;
    }
}

fn extract_ipv4(m: &mut FlowMatch, ip: &[u8]) {
    if ip.len() < 20 {
        return;
    }
    let ihl = ((ip[0] & 0x0f) as usize) * 4;
    m.nw_tos = ip[1] & 0xfc;
    m.nw_proto = ip[9];
    m.nw_src = Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]);
    m.nw_dst = Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]);

    let fragment_offset = u16::from_be_bytes([ip[6], ip[7]]) & 0x1fff;
    if ihl < 20 || fragment_offset != 0 {
        return;
    }
    let Some(l4) = ip.get(ihl..) else {
        return;
    };
    match m.nw_proto {
        IP_PROTO_TCP | IP_PROTO_UDP => {
            if let (Some(sport), Some(dport)) = (u16_at(l4, 0), u16_at(l4, 2)) {
                m.tp_src = sport;
                m.tp_dst = dport;
            }
        }
        IP_PROTO_ICMP => {
            if l4.len() >= 2 {
                m.tp_src = l4[0] as u16;
                m.tp_dst = l4[1] as u16;
            }
        }
        _ => {}
    }
}

/// Test frame builders shared with other crates' tests.
pub mod build {
    use super::*;

    pub fn ethernet(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ETH_HEADER_LEN + payload.len());
        frame.extend_from_slice(&dst.0);
        frame.extend_from_slice(&src.0);
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    /// Minimal IPv4 header (no options) followed by `l4`.
    pub fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, l4: &[u8]) -> Vec<u8> {
        let total = (20 + l4.len()) as u16;
        let mut ip = vec![0x45, 0x00];
        ip.extend_from_slice(&total.to_be_bytes());
        ip.extend_from_slice(&[0, 0, 0x40, 0, 64, proto, 0, 0]);
        ip.extend_from_slice(&src.octets());
        ip.extend_from_slice(&dst.octets());
        ip.extend_from_slice(l4);
        ip
    }

    pub fn udp(sport: u16, dport: u16, body: &[u8]) -> Vec<u8> {
        let mut udp = Vec::with_capacity(8 + body.len());
        udp.extend_from_slice(&sport.to_be_bytes());
        udp.extend_from_slice(&dport.to_be_bytes());
        udp.extend_from_slice(&((8 + body.len()) as u16).to_be_bytes());
        udp.extend_from_slice(&[0, 0]);
        udp.extend_from_slice(body);
        udp
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;
    use crate::openflow::Field;

    fn mac(last: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn udp_frame_yields_full_exact_match() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let frame = ethernet(
            mac(2),
            mac(1),
            ETH_TYPE_IP,
            &ipv4(src, dst, IP_PROTO_UDP, &udp(68, 67, b"dhcp")),
        );

        let m = FlowMatch::from_packet(3, &frame).unwrap();
        assert!(Field::ALL.iter().all(|f| m.is_exact(*f)));
        assert_eq!(m.in_port, 3);
        assert_eq!((m.dl_src, m.dl_dst), (mac(1), mac(2)));
        assert_eq!(m.dl_type, ETH_TYPE_IP);
        assert_eq!(m.dl_vlan, VLAN_NONE);
        assert_eq!((m.nw_src, m.nw_dst, m.nw_proto), (src, dst, IP_PROTO_UDP));
        assert_eq!((m.tp_src, m.tp_dst), (68, 67));
    }

    #[test]
    fn icmp_type_and_code_fill_transport_ports() {
        let frame = ethernet(
            mac(2),
            mac(1),
            ETH_TYPE_IP,
            &ipv4(
                Ipv4Addr::new(1, 1, 1, 1),
                Ipv4Addr::new(2, 2, 2, 2),
                IP_PROTO_ICMP,
                &[8, 0, 0, 0],
            ),
        );
        let m = FlowMatch::from_packet(1, &frame).unwrap();
        assert_eq!((m.tp_src, m.tp_dst), (8, 0));
    }

    #[test]
    fn arp_addresses_and_opcode() {
        let mut arp = vec![0, 1, 8, 0, 6, 4, 0, 2];
        arp.extend_from_slice(&mac(1).0);
        arp.extend_from_slice(&[192, 168, 0, 1]);
        arp.extend_from_slice(&mac(2).0);
        arp.extend_from_slice(&[192, 168, 0, 2]);
        let frame = ethernet(mac(2), mac(1), ETH_TYPE_ARP, &arp);

        let m = FlowMatch::from_packet(1, &frame).unwrap();
        assert_eq!(m.nw_proto, 2);
        assert_eq!(m.nw_src, Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(m.nw_dst, Ipv4Addr::new(192, 168, 0, 2));
        assert_eq!(m.tp_src, 0);
    }

    #[test]
    fn vlan_tag_keeps_outer_ethertype() {
        let mut tagged = vec![0xa0, 0x0a];
        tagged.extend_from_slice(&ETH_TYPE_IP.to_be_bytes());
        tagged.extend_from_slice(&ipv4(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            IP_PROTO_TCP,
            &[0x1f, 0x90, 0x00, 0x50],
        ));
        let frame = ethernet(mac(2), mac(1), ETH_TYPE_VLAN, &tagged);

        let m = FlowMatch::from_packet(1, &frame).unwrap();
        assert_eq!(m.dl_type, ETH_TYPE_VLAN);
        assert_eq!(m.dl_vlan, 10);
        assert_eq!(m.dl_vlan_pcp, 5);
        assert_eq!((m.tp_src, m.tp_dst), (8080, 80));
    }

    #[test]
    fn runt_frames_are_rejected() {
        assert!(FlowMatch::from_packet(1, &[0; 10]).is_err());
    }
}
