//! Local control channel sessions.
//!
//! Each complete JSON document read from a control client becomes a
//! [`ControllerEvent::ControlMessage`]. The document schema belongs to
//! whichever component answers it; replies travel back through
//! [`send_document`].

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};
use vaxel_core::events::Poster;
use vaxel_protocols::control::{encode_document, DocumentFramer};
use vaxel_transport::{CodecFactory, ConnId, Link, StreamCodec};

use crate::events::ControllerEvent;
use crate::services::Services;

pub struct ControlSession {
    poster: Poster<ControllerEvent>,
    framer: DocumentFramer,
}

impl ControlSession {
    pub fn new(poster: Poster<ControllerEvent>) -> Self {
        Self {
            poster,
            framer: DocumentFramer::new(),
        }
    }

    pub fn factory(poster: Poster<ControllerEvent>) -> CodecFactory {
        Arc::new(move |_link: &Link| {
            Box::new(ControlSession::new(poster.clone())) as Box<dyn StreamCodec>
        })
    }
}

impl StreamCodec for ControlSession {
    fn on_open(&mut self, link: &Link) {
        debug!(conn = %link.id(), "Control client connected");
        self.poster.post(ControllerEvent::ConnectionOpened {
            conn: link.id(),
            peer: link.peer().to_owned(),
        });
    }

    fn on_bytes(&mut self, data: &[u8], link: &Link) {
        for document in self.framer.push(data) {
            self.poster.post(ControllerEvent::ControlMessage {
                conn: link.id(),
                document,
            });
        }
    }

    fn on_close(&mut self, link: &Link) {
        if self.framer.buffered() > 0 {
            debug!(
                conn = %link.id(),
                pending = self.framer.buffered(),
                "Incomplete control document discarded"
            );
        }
        self.poster.post(ControllerEvent::ConnectionClosed {
            conn: link.id(),
            dpid: None,
        });
    }
}

/// Replies to a control client.
pub fn send_document(services: &Services, conn: ConnId, document: &Value) -> bool {
    let Some(link) = services.connections.get(conn) else {
        warn!(%conn, "Control reply dropped because connection is already closed");
        services.metrics.send_drops.inc();
        return false;
    };
    match link.send(Bytes::from(encode_document(document))) {
        Ok(()) => {
            services.metrics.messages_sent.inc();
            true
        }
        Err(_) => {
            services.metrics.send_drops.inc();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use serde_json::json;

    #[test]
    fn documents_become_events() {
        let (_services, link, _rx) = services_with_link(ConnId(9));
        let (mut bus, seen) = recording_bus();
        let mut session = ControlSession::new(bus.poster());

        session.on_open(&link);
        session.on_bytes(br#"{"cmd":"stat"#, &link);
        session.on_bytes(br#"us"} {"cmd":"quit"}"#, &link);
        session.on_close(&link);
        bus.run_once().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert_eq!(
            seen[1],
            ControllerEvent::ControlMessage {
                conn: ConnId(9),
                document: json!({"cmd": "status"})
            }
        );
        assert_eq!(
            seen[3],
            ControllerEvent::ConnectionClosed {
                conn: ConnId(9),
                dpid: None
            }
        );
    }

    #[test]
    fn replies_go_back_on_the_same_connection() {
        let (services, _link, mut rx) = services_with_link(ConnId(9));
        assert!(send_document(&services, ConnId(9), &json!({"ok": true})));
        assert_eq!(drain(&mut rx), vec![Bytes::from_static(br#"{"ok":true}"#)]);

        assert!(!send_document(&services, ConnId(10), &json!({})));
        assert_eq!(services.metrics.send_drops.get(), 1);
    }
}
