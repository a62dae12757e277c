//! ## vaxel-engine::session
//! **Per-switch protocol state machine**
//!
//! A session frames the byte stream of one switch connection, performs the
//! hello/features handshake and then turns every message into a controller
//! event. Keepalives are answered here and never reach the dispatch loop.
//!
//! The handshake is tolerant: an unexpected message before the features
//! reply is logged and ignored, the connection stays up.

use std::sync::Arc;

use bytes::Bytes;
use opentelemetry::KeyValue;
use tracing::{debug, info, warn};
use vaxel_core::events::Poster;
use vaxel_protocols::openflow::{
    echo_reply, features_request, get_config_request, hello, Header, MessageType, SwitchConfig,
    SwitchFeatures, DEFAULT_MISS_SEND_LEN, HEADER_LEN,
};
use vaxel_protocols::OpenFlowFramer;
use vaxel_telemetry::EventLogger;
use vaxel_transport::{CodecFactory, Link, StreamCodec};

use crate::events::{ControllerEvent, Switched};
use crate::parser::parse_message;
use crate::services::{Services, SwitchHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sent to the switch in a set-config after the handshake when it
    /// differs from the protocol default.
    pub miss_send_len: u16,
    /// Ask for the switch configuration once ready.
    pub request_config: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            miss_send_len: DEFAULT_MISS_SEND_LEN,
            request_config: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Ready { dpid: u64 },
}

pub struct SwitchSession {
    config: SessionConfig,
    services: Arc<Services>,
    poster: Poster<ControllerEvent>,
    framer: OpenFlowFramer,
    state: SessionState,
}

impl SwitchSession {
    pub fn new(
        config: SessionConfig,
        services: Arc<Services>,
        poster: Poster<ControllerEvent>,
    ) -> Self {
        Self {
            config,
            services,
            poster,
            framer: OpenFlowFramer::new(),
            state: SessionState::AwaitingHandshake,
        }
    }

    /// Codec factory for the switch listener.
    pub fn factory(
        config: SessionConfig,
        services: Arc<Services>,
        poster: Poster<ControllerEvent>,
    ) -> CodecFactory {
        Arc::new(move |_link: &Link| {
            Box::new(SwitchSession::new(config, services.clone(), poster.clone()))
                as Box<dyn StreamCodec>
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn handle(&mut self, message: Bytes, link: &Link) {
        let header = match Header::parse(&message) {
            Ok(header) => header,
            Err(e) => {
                warn!(conn = %link.id(), error = %e, "Malformed header");
                return;
            }
        };

        match self.state {
            SessionState::AwaitingHandshake => self.handshake(&header, &message, link),
            SessionState::Ready { dpid } => self.dispatch(dpid, &header, &message, link),
        }
    }

    fn handshake(&mut self, header: &Header, message: &Bytes, link: &Link) {
        match header.message_type() {
            Ok(MessageType::Hello) => {
                debug!(conn = %link.id(), "Hello received, requesting features");
                self.services.send_on(link, hello(self.services.next_xid()));
                self.services
                    .send_on(link, features_request(self.services.next_xid()));
            }
            Ok(MessageType::FeaturesReply) => match SwitchFeatures::parse(message) {
                Ok(features) => self.complete_handshake(header.xid, features, link),
                Err(e) => {
                    warn!(conn = %link.id(), error = %e, "Malformed features reply");
                    self.services.metrics.malformed_frames.inc();
                }
            },
            other => {
                warn!(
                    conn = %link.id(),
                    msg_type = ?other,
                    "Handshake should not handle message type"
                );
            }
        }
    }

    fn complete_handshake(&mut self, xid: u32, features: SwitchFeatures, link: &Link) {
        let dpid = features.datapath_id;
        let features = Arc::new(features);
        self.state = SessionState::Ready { dpid };

        let previous = self.services.switches.insert(SwitchHandle {
            dpid,
            conn: link.id(),
            features: features.clone(),
        });
        if let Some(previous) = previous {
            warn!(dpid = %format!("{dpid:#x}"), old = %previous.conn, "Switch reconnected");
        }
        self.services
            .metrics
            .connected_switches
            .set(self.services.switches.len() as i64);

        info!(
            conn = %link.id(),
            dpid = %format!("{dpid:#x}"),
            ports = features.ports.len(),
            "Connected to switch"
        );
        EventLogger::log_event(
            "switch_connected",
            &[
                KeyValue::new("dpid", format!("{dpid:#018x}")),
                KeyValue::new("peer", link.peer().to_owned()),
                KeyValue::new("ports", features.ports.len() as i64),
            ],
        );

        if self.config.miss_send_len != DEFAULT_MISS_SEND_LEN {
            let config = SwitchConfig {
                flags: 0,
                miss_send_len: self.config.miss_send_len,
            };
            self.services
                .send_on(link, config.encode_set(self.services.next_xid()));
        }
        if self.config.request_config {
            self.services
                .send_on(link, get_config_request(self.services.next_xid()));
        }

        self.poster.post(ControllerEvent::FeaturesReply(Switched::new(
            link.id(),
            dpid,
            xid,
            features,
        )));
    }

    fn dispatch(&mut self, dpid: u64, header: &Header, message: &Bytes, link: &Link) {
        if header.message_type() == Ok(MessageType::EchoRequest) {
            let payload = &message[HEADER_LEN..];
            self.services.send_on(link, echo_reply(header.xid, payload));
            return;
        }

        match parse_message(link.id(), dpid, message) {
            Ok(Some(event)) => self.poster.post(event),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    conn = %link.id(),
                    xid = header.xid,
                    error = %e,
                    "Undecodable message dropped"
                );
                self.services.metrics.malformed_frames.inc();
            }
        }
    }
}

impl StreamCodec for SwitchSession {
    fn on_open(&mut self, link: &Link) {
        self.poster.post(ControllerEvent::ConnectionOpened {
            conn: link.id(),
            peer: link.peer().to_owned(),
        });
    }

    fn on_bytes(&mut self, data: &[u8], link: &Link) {
        self.framer.push(data);
        while let Some(frame) = self.framer.next_frame() {
            match frame {
                Ok(message) => {
                    self.services.metrics.frames_received.inc();
                    self.handle(message, link);
                }
                Err(e) => {
                    warn!(conn = %link.id(), error = %e, "Malformed frame discarded");
                    self.services.metrics.malformed_frames.inc();
                }
            }
        }
    }

    fn on_close(&mut self, link: &Link) {
        let dpid = match self.state {
            SessionState::Ready { dpid } => {
                self.services.switches.remove(dpid, link.id());
                self.services
                    .metrics
                    .connected_switches
                    .set(self.services.switches.len() as i64);
                info!(conn = %link.id(), dpid = %format!("{dpid:#x}"), "Switch disconnected");
                EventLogger::log_event(
                    "switch_disconnected",
                    &[KeyValue::new("dpid", format!("{dpid:#018x}"))],
                );
                Some(dpid)
            }
            SessionState::AwaitingHandshake => None,
        };
        self.poster.post(ControllerEvent::ConnectionClosed {
            conn: link.id(),
            dpid,
        });
    }
}
