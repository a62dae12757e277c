//! ## vaxel-forwarding::learning
//! **MAC learning switch**
//!
//! Learns which port each source MAC address lives behind, per switch.
//! A packet whose destination is known is forwarded out of that port with
//! an exact rule and propagation stops there. Unknown, broadcast and
//! multicast destinations propagate to the next packet-in handler
//! (normally [`FloodOnMiss`](crate::FloodOnMiss)).
//!
//! Learned addresses age out. The component keeps one private sweep timer
//! per switch. Each timer carries a generation number and only the armed
//! generation is honoured, so reconnects never start a second cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};
use vaxel_core::events::{Context, Handler, HandlerFault, Propagation};
use vaxel_engine::{ControllerEvent, PacketInEvent, Services, Switched};
use vaxel_protocols::openflow::{Action, MacAddr};
use vaxel_protocols::Priority;
use vaxel_transport::ConnId;

use crate::miss::{entry_for, forward};
use crate::ForwardingOptions;

#[derive(Debug, Clone, Copy)]
struct Location {
    port: u16,
    seen_at: Duration,
}

/// What is known about one datapath.
#[derive(Debug)]
struct SwitchTable {
    /// Connection the hosts were learned on; `None` once it closed.
    conn: Option<ConnId>,
    hosts: HashMap<MacAddr, Location>,
    /// Generation of the sweep timer in flight.
    sweep: Option<u64>,
}

impl SwitchTable {
    fn new(conn: ConnId) -> Self {
        Self {
            conn: Some(conn),
            hosts: HashMap::new(),
            sweep: None,
        }
    }
}

pub struct LearningSwitch {
    services: Arc<Services>,
    options: ForwardingOptions,
    switches: HashMap<u64, SwitchTable>,
    generation: u64,
}

impl LearningSwitch {
    pub fn new(services: Arc<Services>, options: ForwardingOptions) -> Self {
        Self {
            services,
            options,
            switches: HashMap::new(),
            generation: 0,
        }
    }

    /// Port `mac` was last seen on at switch `dpid`.
    pub fn lookup(&self, dpid: u64, mac: MacAddr) -> Option<u16> {
        self.switches.get(&dpid)?.hosts.get(&mac).map(|l| l.port)
    }

    pub fn learned(&self, dpid: u64) -> usize {
        self.switches.get(&dpid).map_or(0, |t| t.hosts.len())
    }

    fn learn(&mut self, conn: ConnId, dpid: u64, mac: MacAddr, port: u16, now: Duration) {
        if mac.is_multicast() {
            return;
        }
        let table = self
            .switches
            .entry(dpid)
            .or_insert_with(|| SwitchTable::new(conn));
        table.conn.get_or_insert(conn);
        let location = Location { port, seen_at: now };
        match table.hosts.insert(mac, location) {
            Some(old) if old.port != port => {
                debug!(dpid = %format!("{dpid:#x}"), %mac, from = old.port, to = port, "Host moved")
            }
            Some(_) => {}
            None => trace!(dpid = %format!("{dpid:#x}"), %mac, port, "Learned host"),
        }
    }

    fn packet_in(
        &mut self,
        event: &Switched<PacketInEvent>,
        now: Duration,
    ) -> Propagation {
        let matching = &event.message.matching;
        let in_port = event.message.packet.in_port;
        self.learn(event.conn, event.dpid, matching.dl_src, in_port, now);

        if matching.dl_dst.is_multicast() {
            return Propagation::Continue;
        }
        let Some(out_port) = self.lookup(event.dpid, matching.dl_dst) else {
            return Propagation::Continue;
        };
        if out_port == in_port {
            trace!(%in_port, dst = %matching.dl_dst, "Destination behind ingress port, ignored");
            return Propagation::Stop;
        }

        let mut entry = entry_for(event, self.options.idle_timeout);
        entry
            .set_priority(Priority::Default)
            .add_action(Action::output(out_port));
        debug!(
            dpid = %format!("{:#x}", event.dpid),
            src = %matching.dl_src,
            dst = %matching.dl_dst,
            out_port,
            "Forwarding to learned port"
        );
        forward(&self.services, event, &entry, self.options.install_flows);
        Propagation::Stop
    }

    fn connected(&mut self, dpid: u64, conn: ConnId, ctx: &mut Context<'_, ControllerEvent>) {
        let table = self
            .switches
            .entry(dpid)
            .or_insert_with(|| SwitchTable::new(conn));
        table.conn = Some(conn);
        if table.sweep.is_none() {
            self.arm_sweep(dpid, ctx);
        }
    }

    /// Drops the hosts of `dpid` if `conn` is the connection they were
    /// learned on. A close for an older connection is ignored.
    fn disconnected(&mut self, dpid: u64, conn: ConnId) {
        let Some(table) = self.switches.get_mut(&dpid) else {
            return;
        };
        if table.conn != Some(conn) {
            debug!(dpid = %format!("{dpid:#x}"), %conn, "Close of a replaced connection ignored");
            return;
        }
        table.conn = None;
        table.hosts.clear();
        // An armed sweep ends the cycle when it fires.
        if table.sweep.is_none() {
            self.switches.remove(&dpid);
        }
        debug!(dpid = %format!("{dpid:#x}"), "Forgot learned hosts");
    }

    fn arm_sweep(&mut self, dpid: u64, ctx: &mut Context<'_, ControllerEvent>) {
        let Some(age) = self.options.mac_aging else {
            return;
        };
        let Some(table) = self.switches.get_mut(&dpid) else {
            return;
        };
        self.generation += 1;
        let target = ctx.current_handler();
        let timer = ControllerEvent::Timer {
            tag: self.generation,
        };
        match ctx.post_after_to(age, target, timer) {
            Ok(()) => table.sweep = Some(self.generation),
            Err(e) => {
                table.sweep = None;
                warn!(dpid = %format!("{dpid:#x}"), error = %e, "Cannot schedule MAC aging");
            }
        }
    }

    /// Handles the timer of generation `tag`. Returns the switch to re-arm,
    /// if any.
    fn sweep(&mut self, tag: u64, now: Duration) -> Option<u64> {
        let age = self.options.mac_aging?;
        let Some((&dpid, table)) = self
            .switches
            .iter_mut()
            .find(|(_, table)| table.sweep == Some(tag))
        else {
            trace!(tag, "Stale sweep timer ignored");
            return None;
        };
        table.sweep = None;
        if table.conn.is_none() {
            self.switches.remove(&dpid);
            return None;
        }
        let before = table.hosts.len();
        table
            .hosts
            .retain(|_, location| now.saturating_sub(location.seen_at) < age);
        if table.hosts.len() != before {
            debug!(
                dpid = %format!("{dpid:#x}"),
                expired = before - table.hosts.len(),
                "Aged out hosts"
            );
        }
        Some(dpid)
    }
}

impl Handler<ControllerEvent> for LearningSwitch {
    fn name(&self) -> &str {
        "learning_switch"
    }

    fn handle(
        &mut self,
        event: &ControllerEvent,
        ctx: &mut Context<'_, ControllerEvent>,
    ) -> Result<Propagation, HandlerFault> {
        match event {
            ControllerEvent::PacketIn(event) => return Ok(self.packet_in(event, ctx.now())),
            ControllerEvent::FeaturesReply(event) => self.connected(event.dpid, event.conn, ctx),
            ControllerEvent::ConnectionClosed {
                conn,
                dpid: Some(dpid),
            } => self.disconnected(*dpid, *conn),
            ControllerEvent::Timer { tag } => {
                if let Some(dpid) = self.sweep(*tag, ctx.now()) {
                    self.arm_sweep(dpid, ctx);
                }
            }
            _ => {}
        }
        Ok(Propagation::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::FloodOnMiss;
    use vaxel_engine::kinds;
    use vaxel_protocols::openflow::{port, FlowMod, PacketOut, SwitchFeatures, NO_BUFFER};

    fn learning_harness(options: ForwardingOptions) -> (Harness, vaxel_core::events::HandlerId) {
        learning_harness_on(ConnId(1), options)
    }

    fn learning_harness_on(
        conn: ConnId,
        options: ForwardingOptions,
    ) -> (Harness, vaxel_core::events::HandlerId) {
        let mut harness = Harness::new(conn);
        let learning = LearningSwitch::new(harness.services.clone(), options.clone());
        let id = harness.add(kinds::PACKET_IN, learning);
        for kind in [kinds::FEATURES_REPLY, kinds::CONNECTION_CLOSED] {
            harness.bus.register(kind, id);
        }
        let flood = FloodOnMiss::new(
            harness.services.clone(),
            ForwardingOptions {
                install_flows: false,
                ..options
            },
        );
        harness.add(kinds::PACKET_IN, flood);
        (harness, id)
    }

    fn features_reply(conn: ConnId) -> ControllerEvent {
        let features = SwitchFeatures {
            datapath_id: DPID,
            n_buffers: 0,
            n_tables: 1,
            capabilities: 0,
            actions: 0,
            ports: Vec::new(),
        };
        ControllerEvent::FeaturesReply(Switched::new(conn, DPID, 0, Arc::new(features)))
    }

    fn closed(conn: ConnId) -> ControllerEvent {
        ControllerEvent::ConnectionClosed {
            conn,
            dpid: Some(DPID),
        }
    }

    #[test]
    fn unknown_destination_falls_through_to_flood() {
        let (mut harness, _) = learning_harness(ForwardingOptions::default());
        harness.packet_in(1, NO_BUFFER, &frame(mac(1), mac(2)));

        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        let out = PacketOut::parse(&sent[0]).unwrap();
        assert_eq!(out.actions, vec![Action::output(port::FLOOD)]);
    }

    #[test]
    fn known_destination_gets_an_exact_rule_and_stops() {
        let (mut harness, _) = learning_harness(ForwardingOptions::default());
        harness.packet_in(1, NO_BUFFER, &frame(mac(1), mac(2)));
        harness.packet_in(2, 42, &frame(mac(2), mac(1)));
        let sent = harness.sent();

        // Flood for the first packet, a single rule for the reply.
        assert_eq!(sent.len(), 2);
        let flow = FlowMod::parse(&sent[1]).unwrap();
        assert_eq!(flow.actions, vec![Action::output(1)]);
        assert_eq!(flow.buffer_id, 42);
        assert_eq!(flow.priority, Priority::Default.value());
        assert_eq!(flow.matching.dl_dst, mac(1));
        assert_eq!(flow.matching.in_port, 2);
    }

    #[test]
    fn unbuffered_known_destination_also_emits_the_packet() {
        let (mut harness, _) = learning_harness(ForwardingOptions::default());
        harness.packet_in(1, NO_BUFFER, &frame(mac(1), mac(2)));
        harness.sent();

        let reply = frame(mac(2), mac(1));
        harness.packet_in(2, NO_BUFFER, &reply);
        let sent = harness.sent();
        assert_eq!(sent.len(), 2);
        assert!(FlowMod::parse(&sent[0]).is_ok());
        let out = PacketOut::parse(&sent[1]).unwrap();
        assert_eq!(out.actions, vec![Action::output(1)]);
        assert_eq!(&out.data[..], &reply[..]);
    }

    #[test]
    fn hairpin_is_dropped_silently() {
        let (mut harness, _) = learning_harness(ForwardingOptions::default());
        harness.packet_in(1, NO_BUFFER, &frame(mac(1), mac(2)));
        harness.packet_in(1, NO_BUFFER, &frame(mac(2), mac(1)));
        harness.sent();

        harness.packet_in(1, NO_BUFFER, &frame(mac(3), mac(2)));
        assert!(harness.sent().is_empty());
    }

    #[test]
    fn disconnect_forgets_the_switch() {
        let (mut harness, _) = learning_harness(ForwardingOptions::default());
        harness.packet_in(1, NO_BUFFER, &frame(mac(1), mac(2)));
        harness.sent();

        harness.deliver(closed(ConnId(1)));
        harness.packet_in(2, NO_BUFFER, &frame(mac(2), mac(1)));
        let out = PacketOut::parse(&harness.sent()[0]).unwrap();
        assert_eq!(out.actions, vec![Action::flood()]);
    }

    #[test]
    fn hosts_age_out_on_the_private_timer() {
        let options = ForwardingOptions {
            mac_aging: Some(Duration::from_secs(60)),
            ..ForwardingOptions::default()
        };
        let (mut harness, _) = learning_harness(options);
        harness.deliver(features_reply(ConnId(1)));
        assert_eq!(harness.bus.pending_timed(), 1);

        harness.packet_in(1, NO_BUFFER, &frame(mac(1), mac(2)));
        harness.advance(Duration::from_secs(30));
        harness.packet_in(3, NO_BUFFER, &frame(mac(3), mac(2)));
        harness.sent();

        harness.advance(Duration::from_secs(30));
        // mac(1) was last seen 60s ago; mac(3) only 30s ago.
        harness.packet_in(2, NO_BUFFER, &frame(mac(2), mac(1)));
        let out = PacketOut::parse(&harness.sent()[0]).unwrap();
        assert_eq!(out.actions, vec![Action::flood()]);
        assert_eq!(harness.bus.pending_timed(), 1);

        harness.packet_in(2, NO_BUFFER, &frame(mac(2), mac(3)));
        let flow = FlowMod::parse(&harness.sent()[0]).unwrap();
        assert_eq!(flow.actions, vec![Action::output(3)]);
    }

    #[test]
    fn reconnects_share_one_sweep_cycle() {
        let options = ForwardingOptions {
            mac_aging: Some(Duration::from_secs(60)),
            ..ForwardingOptions::default()
        };
        let (mut harness, _) = learning_harness(options);
        for conn in 1..=3 {
            harness.deliver(features_reply(ConnId(conn)));
            harness.deliver(closed(ConnId(conn)));
        }
        harness.deliver(features_reply(ConnId(4)));
        assert_eq!(harness.bus.pending_timed(), 1);

        // The surviving timer keeps re-arming itself and nothing else.
        for _ in 0..3 {
            harness.advance(Duration::from_secs(60));
            assert_eq!(harness.bus.pending_timed(), 1);
        }
    }

    #[test]
    fn sweep_cycle_ends_once_the_switch_is_gone() {
        let options = ForwardingOptions {
            mac_aging: Some(Duration::from_secs(60)),
            ..ForwardingOptions::default()
        };
        let (mut harness, _) = learning_harness(options);
        harness.deliver(features_reply(ConnId(1)));
        harness.deliver(closed(ConnId(1)));
        assert_eq!(harness.bus.pending_timed(), 1);

        harness.advance(Duration::from_secs(60));
        assert_eq!(harness.bus.pending_timed(), 0);

        harness.deliver(features_reply(ConnId(2)));
        assert_eq!(harness.bus.pending_timed(), 1);
    }

    #[test]
    fn close_of_a_replaced_connection_keeps_learned_hosts() {
        let (mut harness, _) = learning_harness_on(ConnId(2), ForwardingOptions::default());
        harness.deliver(features_reply(ConnId(1)));
        harness.deliver(features_reply(ConnId(2)));
        harness.packet_in(1, NO_BUFFER, &frame(mac(1), mac(2)));
        harness.sent();

        harness.deliver(closed(ConnId(1)));
        harness.packet_in(2, 7, &frame(mac(2), mac(1)));
        let sent = harness.sent();
        assert_eq!(sent.len(), 1);
        let flow = FlowMod::parse(&sent[0]).unwrap();
        assert_eq!(flow.actions, vec![Action::output(1)]);

        // The current connection still forgets on close.
        harness.deliver(closed(ConnId(2)));
        harness.packet_in(2, NO_BUFFER, &frame(mac(2), mac(1)));
        let out = PacketOut::parse(&harness.sent()[0]).unwrap();
        assert_eq!(out.actions, vec![Action::flood()]);
    }
}
