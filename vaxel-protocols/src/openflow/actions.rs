//! Action lists.
//!
//! Actions are TLVs with a 4-byte type/length prefix, each padded to a
//! multiple of 8 bytes. They execute in list order.

use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes};

use super::matching::MacAddr;
use super::{port, ProtocolError, DEFAULT_MISS_SEND_LEN};

mod code {
    pub const OUTPUT: u16 = 0;
    pub const SET_VLAN_VID: u16 = 1;
    pub const SET_VLAN_PCP: u16 = 2;
    pub const STRIP_VLAN: u16 = 3;
    pub const SET_DL_SRC: u16 = 4;
    pub const SET_DL_DST: u16 = 5;
    pub const SET_NW_SRC: u16 = 6;
    pub const SET_NW_DST: u16 = 7;
    pub const SET_NW_TOS: u16 = 8;
    pub const SET_TP_SRC: u16 = 9;
    pub const SET_TP_DST: u16 = 10;
    pub const ENQUEUE: u16 = 11;
    pub const VENDOR: u16 = 0xffff;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Output { port: u16, max_len: u16 },
    SetVlanVid(u16),
    SetVlanPcp(u8),
    StripVlan,
    SetDlSrc(MacAddr),
    SetDlDst(MacAddr),
    SetNwSrc(Ipv4Addr),
    SetNwDst(Ipv4Addr),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue { port: u16, queue_id: u32 },
    Vendor { vendor: u32, body: Bytes },
}

impl Action {
    pub fn output(port: u16) -> Self {
        Action::Output { port, max_len: 0 }
    }

    pub fn flood() -> Self {
        Action::output(port::FLOOD)
    }

    /// Sends up to `max_len` bytes of the packet to the controller.
    pub fn to_controller(max_len: u16) -> Self {
        Action::Output {
            port: port::CONTROLLER,
            max_len,
        }
    }

    pub fn default_to_controller() -> Self {
        Action::to_controller(DEFAULT_MISS_SEND_LEN)
    }

    /// Encoded size in bytes.
    pub fn wire_len(&self) -> usize {
        match self {
            Action::SetDlSrc(_) | Action::SetDlDst(_) | Action::Enqueue { .. } => 16,
            Action::Vendor { body, .. } => (8 + body.len()).next_multiple_of(8),
            _ => 8,
        }
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        let len = self.wire_len() as u16;
        match self {
            Action::Output { port, max_len } => {
                buf.put_u16(code::OUTPUT);
                buf.put_u16(len);
                buf.put_u16(*port);
                buf.put_u16(*max_len);
            }
            Action::SetVlanVid(vid) => {
                buf.put_u16(code::SET_VLAN_VID);
                buf.put_u16(len);
                buf.put_u16(*vid);
                buf.put_bytes(0, 2);
            }
            Action::SetVlanPcp(pcp) => {
                buf.put_u16(code::SET_VLAN_PCP);
                buf.put_u16(len);
                buf.put_u8(*pcp);
                buf.put_bytes(0, 3);
            }
            Action::StripVlan => {
                buf.put_u16(code::STRIP_VLAN);
                buf.put_u16(len);
                buf.put_bytes(0, 4);
            }
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                let kind = if matches!(self, Action::SetDlSrc(_)) {
                    code::SET_DL_SRC
                } else {
                    code::SET_DL_DST
                };
                buf.put_u16(kind);
                buf.put_u16(len);
                buf.put_slice(&mac.0);
                buf.put_bytes(0, 6);
            }
            Action::SetNwSrc(addr) | Action::SetNwDst(addr) => {
                let kind = if matches!(self, Action::SetNwSrc(_)) {
                    code::SET_NW_SRC
                } else {
                    code::SET_NW_DST
                };
                buf.put_u16(kind);
                buf.put_u16(len);
                buf.put_slice(&addr.octets());
            }
            Action::SetNwTos(tos) => {
                buf.put_u16(code::SET_NW_TOS);
                buf.put_u16(len);
                buf.put_u8(*tos);
                buf.put_bytes(0, 3);
            }
            Action::SetTpSrc(tp) | Action::SetTpDst(tp) => {
                let kind = if matches!(self, Action::SetTpSrc(_)) {
                    code::SET_TP_SRC
                } else {
                    code::SET_TP_DST
                };
                buf.put_u16(kind);
                buf.put_u16(len);
                buf.put_u16(*tp);
                buf.put_bytes(0, 2);
            }
            Action::Enqueue { port, queue_id } => {
                buf.put_u16(code::ENQUEUE);
                buf.put_u16(len);
                buf.put_u16(*port);
                buf.put_bytes(0, 6);
                buf.put_u32(*queue_id);
            }
            Action::Vendor { vendor, body } => {
                buf.put_u16(code::VENDOR);
                buf.put_u16(len);
                buf.put_u32(*vendor);
                buf.put_slice(body);
                buf.put_bytes(0, self.wire_len() - 8 - body.len());
            }
        }
    }
}

/// Total encoded size of an action list.
pub fn actions_len(actions: &[Action]) -> usize {
    actions.iter().map(Action::wire_len).sum()
}

pub fn write_actions(actions: &[Action], buf: &mut impl BufMut) {
    for action in actions {
        action.write(buf);
    }
}

/// Decodes a complete action array.
pub fn parse_actions(data: &[u8]) -> Result<Vec<Action>, ProtocolError> {
    let mut actions = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let rest = &data[offset..];
        if rest.len() < 8 {
            return Err(ProtocolError::BadAction {
                offset,
                reason: "truncated action header",
            });
        }
        let kind = u16::from_be_bytes([rest[0], rest[1]]);
        let len = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        if len < 8 || len % 8 != 0 || len > rest.len() {
            return Err(ProtocolError::BadAction {
                offset,
                reason: "bad action length",
            });
        }
        let a = &rest[..len];
        let u16_at = |i: usize| u16::from_be_bytes([a[i], a[i + 1]]);
        let mac_at = |i: usize| {
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&a[i..i + 6]);
            MacAddr(mac)
        };
        let need = |n: usize| {
            if len < n {
                Err(ProtocolError::BadAction {
                    offset,
                    reason: "action shorter than its type requires",
                })
            } else {
                Ok(())
            }
        };

        let action = match kind {
            code::OUTPUT => Action::Output {
                port: u16_at(4),
                max_len: u16_at(6),
            },
            code::SET_VLAN_VID => Action::SetVlanVid(u16_at(4)),
            code::SET_VLAN_PCP => Action::SetVlanPcp(a[4]),
            code::STRIP_VLAN => Action::StripVlan,
            code::SET_DL_SRC => {
                need(16)?;
                Action::SetDlSrc(mac_at(4))
            }
            code::SET_DL_DST => {
                need(16)?;
                Action::SetDlDst(mac_at(4))
            }
            code::SET_NW_SRC => Action::SetNwSrc(Ipv4Addr::new(a[4], a[5], a[6], a[7])),
            code::SET_NW_DST => Action::SetNwDst(Ipv4Addr::new(a[4], a[5], a[6], a[7])),
            code::SET_NW_TOS => Action::SetNwTos(a[4]),
            code::SET_TP_SRC => Action::SetTpSrc(u16_at(4)),
            code::SET_TP_DST => Action::SetTpDst(u16_at(4)),
            code::ENQUEUE => {
                need(16)?;
                Action::Enqueue {
                    port: u16_at(4),
                    queue_id: u32::from_be_bytes([a[12], a[13], a[14], a[15]]),
                }
            }
            code::VENDOR => Action::Vendor {
                vendor: u32::from_be_bytes([a[4], a[5], a[6], a[7]]),
                body: Bytes::copy_from_slice(&a[8..]),
            },
            _ => {
                return Err(ProtocolError::BadAction {
                    offset,
                    reason: "unknown action type",
                })
            }
        };
        actions.push(action);
        offset += len;
    }

    Ok(actions)
}
