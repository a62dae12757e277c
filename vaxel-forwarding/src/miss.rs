//! Table-miss policies.
//!
//! Both components react to every packet-in they see and let it propagate,
//! so they belong at the end of the handler list for `openflow.packet_in`.

use std::sync::Arc;

use tracing::{debug, warn};
use vaxel_core::events::{Context, Handler, HandlerFault, Propagation};
use vaxel_engine::{ControllerEvent, PacketInEvent, Services, Switched};
use vaxel_protocols::openflow::{Action, FlowModCommand};
use vaxel_protocols::{BufferRef, FlowEntry};

use crate::ForwardingOptions;

/// Entry for exactly the flow of `event`, referencing the switch's copy of
/// the packet when it kept one.
pub(crate) fn entry_for(event: &Switched<PacketInEvent>, idle_timeout: u16) -> FlowEntry {
    let mut entry = FlowEntry::new(event.message.matching);
    entry
        .set_buffer(BufferRef::from_wire(event.message.packet.buffer_id))
        .set_timeouts(idle_timeout, 0);
    entry
}

/// Applies `entry` to the packet of `event`.
///
/// With `install` a rule is added first; a buffered packet is then released
/// by the rule itself. Otherwise, or when the switch kept no copy, the
/// packet is sent back out with the entry's actions.
pub(crate) fn forward(
    services: &Services,
    event: &Switched<PacketInEvent>,
    entry: &FlowEntry,
    install: bool,
) {
    if install {
        services.send(
            event.conn,
            entry.render_install(FlowModCommand::Add, services.next_xid()),
        );
        if entry.buffer() != BufferRef::Unbuffered {
            return;
        }
    }
    let emission = entry.render_emit(false, services.next_xid());
    match emission.with_payload(&event.message.packet.data) {
        Ok(message) => {
            services.send(event.conn, message);
        }
        Err(e) => warn!(dpid = event.dpid, error = %e, "Packet-out not sent"),
    }
}

/// Floods packets the switch had no rule for.
pub struct FloodOnMiss {
    services: Arc<Services>,
    options: ForwardingOptions,
}

impl FloodOnMiss {
    pub fn new(services: Arc<Services>, options: ForwardingOptions) -> Self {
        Self { services, options }
    }
}

impl Handler<ControllerEvent> for FloodOnMiss {
    fn name(&self) -> &str {
        "flood_on_miss"
    }

    fn handle(
        &mut self,
        event: &ControllerEvent,
        _ctx: &mut Context<'_, ControllerEvent>,
    ) -> Result<Propagation, HandlerFault> {
        if let ControllerEvent::PacketIn(event) = event {
            let mut entry = entry_for(event, self.options.idle_timeout);
            entry.add_action(Action::flood());
            debug!(
                dpid = %format!("{:#x}", event.dpid),
                buffered = event.message.packet.is_buffered(),
                matching = ?event.message.matching,
                "Flood packet"
            );
            forward(&self.services, event, &entry, self.options.install_flows);
        }
        Ok(Propagation::Continue)
    }
}

/// Installs a short-lived rule dropping the missed flow.
///
/// A rule is always installed. It references the buffered packet, if any,
/// which the switch then discards, so nothing is ever sent back out.
pub struct DropOnMiss {
    services: Arc<Services>,
    idle_timeout: u16,
}

impl DropOnMiss {
    pub fn new(services: Arc<Services>, options: ForwardingOptions) -> Self {
        Self {
            services,
            idle_timeout: options.idle_timeout,
        }
    }
}

impl Handler<ControllerEvent> for DropOnMiss {
    fn name(&self) -> &str {
        "drop_on_miss"
    }

    fn handle(
        &mut self,
        event: &ControllerEvent,
        _ctx: &mut Context<'_, ControllerEvent>,
    ) -> Result<Propagation, HandlerFault> {
        if let ControllerEvent::PacketIn(event) = event {
            let entry = entry_for(event, self.idle_timeout);
            debug!(
                dpid = %format!("{:#x}", event.dpid),
                matching = ?event.message.matching,
                "Dropping flow"
            );
            self.services.send(
                event.conn,
                entry.render_install(FlowModCommand::Add, self.services.next_xid()),
            );
        }
        Ok(Propagation::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use vaxel_engine::kinds;
    use vaxel_protocols::openflow::{port, FlowMod, PacketOut, NO_BUFFER};
    use vaxel_transport::ConnId;

    fn options(install_flows: bool) -> ForwardingOptions {
        ForwardingOptions {
            install_flows,
            ..ForwardingOptions::default()
        }
    }

    #[test]
    fn flood_unbuffered_installs_and_sends_the_packet() {
        let mut harness = Harness::new(ConnId(1));
        harness.add(kinds::PACKET_IN, FloodOnMiss::new(harness.services.clone(), options(true)));

        let frame = frame(mac(1), mac(2));
        harness.packet_in(1, NO_BUFFER, &frame);
        let sent = harness.sent();
        assert_eq!(sent.len(), 2);

        let flow = FlowMod::parse(&sent[0]).unwrap();
        assert_eq!(flow.actions, vec![Action::flood()]);
        assert_eq!(flow.buffer_id, NO_BUFFER);
        assert_eq!(flow.idle_timeout, 5);

        let out = PacketOut::parse(&sent[1]).unwrap();
        assert_eq!(out.in_port, 1);
        assert_eq!(out.actions, vec![Action::output(port::FLOOD)]);
        assert_eq!(&out.data[..], &frame[..]);
    }

    #[test]
    fn flood_buffered_relies_on_the_rule() {
        let mut harness = Harness::new(ConnId(1));
        harness.add(kinds::PACKET_IN, FloodOnMiss::new(harness.services.clone(), options(true)));

        harness.packet_in(2, 7, &frame(mac(1), mac(2)));
        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(FlowMod::parse(&sent[0]).unwrap().buffer_id, 7);
    }

    #[test]
    fn flood_without_rules_references_the_buffer() {
        let mut harness = Harness::new(ConnId(1));
        harness.add(kinds::PACKET_IN, FloodOnMiss::new(harness.services.clone(), options(false)));

        harness.packet_in(2, 7, &frame(mac(1), mac(2)));
        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        let out = PacketOut::parse(&sent[0]).unwrap();
        assert_eq!(out.buffer_id, 7);
        assert!(out.data.is_empty());
    }

    #[test]
    fn drop_installs_a_rule_without_actions() {
        let mut harness = Harness::new(ConnId(1));
        harness.add(kinds::PACKET_IN, DropOnMiss::new(harness.services.clone(), options(false)));

        harness.packet_in(3, 9, &frame(mac(1), mac(2)));
        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        let flow = FlowMod::parse(&sent[0]).unwrap();
        assert!(flow.actions.is_empty());
        assert_eq!(flow.buffer_id, 9);
        assert_eq!(flow.idle_timeout, 5);
        assert_eq!(flow.matching.in_port, 3);
    }
}
