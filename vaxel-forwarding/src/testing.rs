//! Shared fixtures for the crate's unit tests.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use vaxel_core::cleanup::CleanupRegistry;
use vaxel_core::events::{Bus, BusConfig, Handler, HandlerId};
use vaxel_core::time::VirtualClock;
use vaxel_engine::{ControllerEvent, PacketInEvent, Services, Switched};
use vaxel_protocols::openflow::{FlowMatch, MacAddr, PacketIn};
use vaxel_protocols::packet::build::{ethernet, ipv4, udp};
use vaxel_protocols::packet::{ETH_TYPE_IP, IP_PROTO_UDP};
use vaxel_transport::{ConnId, ConnectionTable, Link};

pub const DPID: u64 = 0x1;

pub fn mac(last: u8) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, 0, last])
}

/// A small UDP frame from `src` to `dst`.
pub fn frame(src: MacAddr, dst: MacAddr) -> Vec<u8> {
    ethernet(
        dst,
        src,
        ETH_TYPE_IP,
        &ipv4(
            Ipv4Addr::new(10, 0, 0, src.0[5]),
            Ipv4Addr::new(10, 0, 0, dst.0[5]),
            IP_PROTO_UDP,
            &udp(4000, 5000, b"payload"),
        ),
    )
}

/// A bus on a virtual clock plus one switch connection whose outbound
/// queue the test reads.
pub struct Harness {
    pub services: Arc<Services>,
    pub bus: Bus<ControllerEvent>,
    pub clock: Arc<VirtualClock>,
    pub conn: ConnId,
    rx: mpsc::Receiver<Bytes>,
}

impl Harness {
    pub fn new(conn: ConnId) -> Self {
        let table = ConnectionTable::new();
        let (tx, rx) = mpsc::channel(64);
        table.insert(Link::new(conn, "switch", tx));
        let services = Arc::new(Services::new(table, CleanupRegistry::new()).unwrap());
        let clock = Arc::new(VirtualClock::new(0));
        let bus = Bus::new(BusConfig::default(), clock.clone(), CleanupRegistry::new());
        Self {
            services,
            bus,
            clock,
            conn,
            rx,
        }
    }

    pub fn add(
        &mut self,
        kind: &str,
        handler: impl Handler<ControllerEvent> + 'static,
    ) -> HandlerId {
        let id = self.bus.add_handler(handler);
        self.bus.register(kind, id);
        id
    }

    pub fn deliver(&mut self, event: ControllerEvent) {
        self.bus.post(event);
        self.bus.run_once().unwrap();
    }

    pub fn packet_in(&mut self, in_port: u16, buffer_id: u32, frame: &[u8]) {
        let packet = PacketIn {
            buffer_id,
            total_len: frame.len() as u16,
            in_port,
            reason: PacketIn::REASON_NO_MATCH,
            data: Bytes::copy_from_slice(frame),
        };
        let matching = FlowMatch::from_packet(in_port, frame).unwrap();
        self.deliver(ControllerEvent::PacketIn(Switched::new(
            self.conn,
            DPID,
            0,
            PacketInEvent { packet, matching },
        )));
    }

    pub fn advance(&mut self, by: Duration) {
        self.clock.advance_by(by);
        self.bus.run_once().unwrap();
    }

    pub fn sent(&mut self) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            out.push(message);
        }
        out
    }
}
