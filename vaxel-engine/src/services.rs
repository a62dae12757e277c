//! ## vaxel-engine::services
//! **Process-wide service context**
//!
//! Created once at start-up and shared by the switch sessions (on the I/O
//! thread) and the policy components (on the dispatch thread). Holds
//! everything that would otherwise be a global: metrics, the transaction id
//! counter, the switch registry and the connection table used for sending.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use tracing::{trace, warn};
use vaxel_core::cleanup::CleanupRegistry;
use vaxel_protocols::openflow::{stamp_length, Header, SwitchFeatures, HEADER_LEN};
use vaxel_telemetry::MetricsRecorder;
use vaxel_transport::{ConnId, ConnectionTable, Link};

use crate::error::EngineError;

/// Monotonic transaction ids shared by every sender.
#[derive(Debug)]
pub struct XidGenerator {
    next: AtomicU32,
}

impl Default for XidGenerator {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }
}

impl XidGenerator {
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// A switch that completed its handshake.
#[derive(Clone, Debug)]
pub struct SwitchHandle {
    pub dpid: u64,
    pub conn: ConnId,
    pub features: Arc<SwitchFeatures>,
}

/// Ready switches by datapath id.
#[derive(Clone, Default)]
pub struct SwitchRegistry {
    inner: Arc<RwLock<HashMap<u64, SwitchHandle>>>,
}

impl SwitchRegistry {
    /// Records a switch. A reconnecting datapath replaces its old entry.
    pub fn insert(&self, handle: SwitchHandle) -> Option<SwitchHandle> {
        self.inner.write().insert(handle.dpid, handle)
    }

    /// Removes `dpid` only while it is still bound to `conn`, so a stale
    /// connection closing cannot evict its replacement.
    pub fn remove(&self, dpid: u64, conn: ConnId) -> Option<SwitchHandle> {
        let mut inner = self.inner.write();
        match inner.get(&dpid) {
            Some(handle) if handle.conn == conn => inner.remove(&dpid),
            _ => None,
        }
    }

    pub fn get(&self, dpid: u64) -> Option<SwitchHandle> {
        self.inner.read().get(&dpid).cloned()
    }

    pub fn conn(&self, dpid: u64) -> Option<ConnId> {
        self.inner.read().get(&dpid).map(|h| h.conn)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn dpids(&self) -> Vec<u64> {
        let mut dpids: Vec<_> = self.inner.read().keys().copied().collect();
        dpids.sort_unstable();
        dpids
    }
}

pub struct Services {
    pub metrics: MetricsRecorder,
    pub xids: XidGenerator,
    pub switches: SwitchRegistry,
    pub connections: ConnectionTable,
    pub cleanup: CleanupRegistry,
}

impl Services {
    pub fn new(
        connections: ConnectionTable,
        cleanup: CleanupRegistry,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            metrics: MetricsRecorder::new()?,
            xids: XidGenerator::default(),
            switches: SwitchRegistry::default(),
            connections,
            cleanup,
        })
    }

    pub fn next_xid(&self) -> u32 {
        self.xids.next()
    }

    /// Sends an OpenFlow message on connection `conn`.
    pub fn send(&self, conn: ConnId, message: Bytes) -> bool {
        match self.connections.get(conn) {
            Some(link) => self.send_on(&link, message),
            None => {
                warn!(%conn, "Message dropped because connection is already closed");
                self.metrics.send_drops.inc();
                false
            }
        }
    }

    /// Sends to a ready switch by datapath id.
    pub fn send_to_switch(&self, dpid: u64, message: Bytes) -> bool {
        match self.switches.conn(dpid) {
            Some(conn) => self.send(conn, message),
            None => {
                warn!(dpid = %format!("{dpid:#x}"), "No switch connection, message dropped");
                self.metrics.send_drops.inc();
                false
            }
        }
    }

    /// Sends `message` on `link`, stamping its total length into the
    /// header first. Messages shorter than a header are refused.
    pub fn send_on(&self, link: &Link, message: Bytes) -> bool {
        if message.len() < HEADER_LEN {
            warn!(
                conn = %link.id(),
                len = message.len(),
                "Cannot send OpenFlow message shorter than a header"
            );
            self.metrics.send_drops.inc();
            return false;
        }

        let message = match Header::parse(&message) {
            Ok(header) if header.length as usize == message.len() => message,
            _ => {
                let mut buf = BytesMut::from(&message[..]);
                if let Err(e) = stamp_length(&mut buf) {
                    warn!(conn = %link.id(), error = %e, "Cannot send OpenFlow message");
                    self.metrics.send_drops.inc();
                    return false;
                }
                buf.freeze()
            }
        };

        trace!(conn = %link.id(), len = message.len(), "Send message");
        match link.send(message) {
            Ok(()) => {
                self.metrics.messages_sent.inc();
                true
            }
            Err(_) => {
                self.metrics.send_drops.inc();
                false
            }
        }
    }
}
