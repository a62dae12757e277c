//! ## vaxel-telemetry::metrics
//! **Prometheus registry for the transport and dispatch paths**

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub frames_received: IntCounter,
    pub messages_sent: IntCounter,
    pub send_drops: IntCounter,
    pub malformed_frames: IntCounter,
    pub events_dispatched: IntCounter,
    pub events_unhandled: IntCounter,
    pub connected_switches: IntGauge,
    pub dispatch_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let frames_received = counter("vaxel_frames_received_total", "Complete frames read from peers")?;
        let messages_sent = counter("vaxel_messages_sent_total", "Messages queued to peers")?;
        let send_drops = counter("vaxel_send_drops_total", "Messages dropped on a full or closed connection")?;
        let malformed_frames = counter("vaxel_malformed_frames_total", "Frames discarded as malformed")?;
        let events_dispatched = counter("vaxel_events_dispatched_total", "Events delivered to at least one handler")?;
        let events_unhandled = counter("vaxel_events_unhandled_total", "Events dropped for lack of handlers")?;

        let connected_switches = IntGauge::new("vaxel_connected_switches", "Switches past the handshake")?;
        registry.register(Box::new(connected_switches.clone()))?;

        let dispatch_latency = Histogram::with_opts(
            HistogramOpts::new("vaxel_dispatch_latency_ns", "Time spent dispatching one event")
                .buckets(vec![1_000.0, 10_000.0, 100_000.0, 1_000_000.0, 10_000_000.0]),
        )?;
        registry.register(Box::new(dispatch_latency.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            messages_sent,
            send_drops,
            malformed_frames,
            events_dispatched,
            events_unhandled,
            connected_switches,
            dispatch_latency,
        })
    }

    /// Text exposition format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_appear_in_exposition() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.frames_received.inc_by(3);
        metrics.connected_switches.set(2);
        metrics.dispatch_latency.observe(5_000.0);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("vaxel_frames_received_total 3"));
        assert!(text.contains("vaxel_connected_switches 2"));
        assert!(text.contains("vaxel_dispatch_latency_ns_count 1"));
    }

    #[test]
    fn recorders_are_independent() {
        let a = MetricsRecorder::new().unwrap();
        let b = MetricsRecorder::new().unwrap();
        a.send_drops.inc();
        assert_eq!(b.send_drops.get(), 0);
    }
}
