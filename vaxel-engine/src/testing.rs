//! Shared fixtures for the crate's unit tests.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use vaxel_core::cleanup::CleanupRegistry;
use vaxel_core::events::{Bus, BusConfig, Context, Handler, HandlerFault, Propagation};
use vaxel_core::time::VirtualClock;
use vaxel_protocols::openflow::{MacAddr, PhyPort, SwitchFeatures};
use vaxel_transport::{ConnId, ConnectionTable, Link};

use crate::events::{kinds, ControllerEvent};
use crate::services::Services;

/// Services with one registered connection whose outbound queue the test
/// can read.
pub fn services_with_link(conn: ConnId) -> (Arc<Services>, Link, mpsc::Receiver<Bytes>) {
    let table = ConnectionTable::new();
    let (tx, rx) = mpsc::channel(64);
    let link = Link::new(conn, "test-peer", tx);
    table.insert(link.clone());
    let services = Services::new(table, CleanupRegistry::new()).unwrap();
    (Arc::new(services), link, rx)
}

pub fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Bytes> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

struct Recorder(Arc<Mutex<Vec<ControllerEvent>>>);

impl Handler<ControllerEvent> for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn handle(
        &mut self,
        event: &ControllerEvent,
        _ctx: &mut Context<'_, ControllerEvent>,
    ) -> Result<Propagation, HandlerFault> {
        self.0.lock().push(event.clone());
        Ok(Propagation::Continue)
    }
}

/// A bus with a handler recording every kind of event.
pub fn recording_bus() -> (Bus<ControllerEvent>, Arc<Mutex<Vec<ControllerEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bus = Bus::new(
        BusConfig::default(),
        Arc::new(VirtualClock::new(0)),
        CleanupRegistry::new(),
    );
    let id = bus.add_handler(Recorder(seen.clone()));
    for kind in kinds::ALL {
        bus.register(kind, id);
    }
    (bus, seen)
}

pub fn features(dpid: u64, ports: &[u16]) -> SwitchFeatures {
    SwitchFeatures {
        datapath_id: dpid,
        n_buffers: 256,
        n_tables: 1,
        capabilities: 0,
        actions: 0xfff,
        ports: ports
            .iter()
            .map(|&port_no| PhyPort {
                port_no,
                hw_addr: MacAddr([0x02, 0, 0, 0, 0, port_no as u8]),
                name: format!("eth{port_no}"),
                config: 0,
                state: 0,
                curr: 0,
                advertised: 0,
                supported: 0,
                peer: 0,
            })
            .collect(),
    }
}
