//! Per-connection write handle and the byte-consumer contract.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::SendError;

/// Connection identifier, unique for the lifetime of a multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Cheap, cloneable write side of one connection.
///
/// Sending never blocks: messages go onto a bounded queue drained by the
/// connection's writer task.
#[derive(Clone)]
pub struct Link {
    id: ConnId,
    peer: Arc<str>,
    tx: mpsc::Sender<Bytes>,
}

impl Link {
    pub fn new(id: ConnId, peer: impl Into<Arc<str>>, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            peer: peer.into(),
            tx,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queues `message` for writing. A full queue or a closed connection
    /// drops the message with a warning.
    pub fn send(&self, message: Bytes) -> Result<(), SendError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(conn = %self.id, peer = %self.peer, "Send queue full, message dropped");
                SendError::Full
            }
            mpsc::error::TrySendError::Closed(_) => {
                warn!(conn = %self.id, peer = %self.peer, "Broken pipe, message dropped");
                SendError::Closed
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Consumes the bytes read from one connection.
///
/// All callbacks run on the I/O thread and must not block.
pub trait StreamCodec: Send + 'static {
    fn on_open(&mut self, _link: &Link) {}

    fn on_bytes(&mut self, data: &[u8], link: &Link);

    /// Called once, after the peer closed or a read failed.
    fn on_close(&mut self, _link: &Link) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn full_queue_drops_with_warning() {
        let (tx, mut rx) = mpsc::channel(1);
        let link = Link::new(ConnId(7), "127.0.0.1:5000", tx);

        assert_eq!(link.send(Bytes::from_static(b"a")), Ok(()));
        assert_eq!(link.send(Bytes::from_static(b"b")), Err(SendError::Full));
        assert!(logs_contain("Send queue full"));

        assert_eq!(rx.recv().await, Some(Bytes::from_static(b"a")));
        drop(rx);
        assert_eq!(link.send(Bytes::from_static(b"c")), Err(SendError::Closed));
        assert!(logs_contain("Broken pipe"));
        assert!(link.is_closed());
    }

    #[test]
    fn conn_ids_display_compactly() {
        assert_eq!(ConnId(12).to_string(), "conn-12");
    }
}
