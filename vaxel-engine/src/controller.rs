//! ## vaxel-engine::controller
//! **Controller runtime**
//!
//! Wires the pieces together: the transport multiplexer on its I/O thread,
//! the switch listener with one [`SwitchSession`] per connection, the
//! optional local control socket and the dispatch loop that runs the
//! policy components. [`Controller::run`] blocks the calling thread until
//! shutdown or a fatal handler fault; either way the cleanup cascade has
//! run when it returns.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{error, info};
use vaxel_core::cleanup::CleanupRegistry;
use vaxel_core::events::{
    Bus, BusConfig, DispatchObserver, EventKind, Handler, HandlerId, Poster, ShutdownHandle,
};
use vaxel_core::time::SystemClock;
use vaxel_core::BusError;
use vaxel_telemetry::EventLogger;
use vaxel_transport::{BindSpec, Listener, Multiplexer, TransportConfig};

use crate::control::ControlSession;
use crate::error::EngineError;
use crate::events::ControllerEvent;
use crate::services::Services;
use crate::session::{SessionConfig, SwitchSession};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub bus: BusConfig,
    pub transport: TransportConfig,
    pub session: SessionConfig,
    /// Switch listener, `host:port`.
    pub openflow_addr: String,
    pub control_socket: Option<PathBuf>,
    pub force_unlink: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
            openflow_addr: "0.0.0.0:6633".to_owned(),
            control_socket: None,
            force_unlink: true,
        }
    }
}

/// Feeds dispatch statistics into the Prometheus recorder.
struct MetricsObserver {
    services: Arc<Services>,
}

impl DispatchObserver for MetricsObserver {
    fn on_dispatched(&self, _kind: &EventKind, _handlers: usize, elapsed: Duration) {
        let metrics = &self.services.metrics;
        metrics.events_dispatched.inc();
        metrics.dispatch_latency.observe(elapsed.as_secs_f64());
    }

    fn on_unhandled(&self, _kind: &EventKind) {
        self.services.metrics.events_unhandled.inc();
    }
}

pub struct Controller {
    bus: Bus<ControllerEvent>,
    services: Arc<Services>,
    // Dropped after the bus so the I/O thread outlives the cleanup cascade.
    multiplexer: Multiplexer,
    switch_listener: Listener,
    control_listener: Option<Listener>,
}

impl Controller {
    /// Binds every listener and prepares the dispatch loop. No event is
    /// dispatched until [`run`](Self::run) or [`run_once`](Self::run_once).
    pub fn new(config: ControllerConfig) -> Result<Self, EngineError> {
        let openflow_addr: SocketAddr =
            config
                .openflow_addr
                .parse()
                .map_err(|source| EngineError::InvalidAddress {
                    addr: config.openflow_addr.clone(),
                    source,
                })?;

        let cleanup = CleanupRegistry::new();
        let multiplexer = Multiplexer::start(config.transport.clone())?;
        let services = Arc::new(Services::new(multiplexer.table(), cleanup.clone())?);
        let bus = Bus::new(config.bus, Arc::new(SystemClock::new()), cleanup.clone())
            .with_observer(MetricsObserver {
                services: services.clone(),
            });

        let switch_listener = multiplexer.listen(
            BindSpec::Tcp(openflow_addr),
            SwitchSession::factory(config.session, services.clone(), bus.poster()),
        )?;
        info!(addr = ?switch_listener.local_addr(), "Listening for switches");

        let control_listener = match config.control_socket {
            Some(path) => {
                let listener = multiplexer.listen(
                    BindSpec::Unix {
                        path: path.clone(),
                        force_unlink: config.force_unlink,
                    },
                    ControlSession::factory(bus.poster()),
                )?;
                info!(path = %path.display(), "Listening for control clients");
                Some(listener)
            }
            None => None,
        };

        cleanup.register(multiplexer.cleanup_handle());

        Ok(Self {
            bus,
            services,
            multiplexer,
            switch_listener,
            control_listener,
        })
    }

    pub fn services(&self) -> Arc<Services> {
        self.services.clone()
    }

    pub fn bus(&self) -> &Bus<ControllerEvent> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus<ControllerEvent> {
        &mut self.bus
    }

    pub fn add_handler(&mut self, handler: impl Handler<ControllerEvent> + 'static) -> HandlerId {
        self.bus.add_handler(handler)
    }

    pub fn register(&mut self, kind: impl AsRef<str>, handler: HandlerId) -> bool {
        self.bus.register(kind, handler)
    }

    pub fn poster(&self) -> Poster<ControllerEvent> {
        self.bus.poster()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.bus.shutdown_handle()
    }

    pub fn cleanup_registry(&self) -> &CleanupRegistry {
        self.bus.cleanup_registry()
    }

    /// Bound switch listener address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.switch_listener.local_addr()
    }

    pub fn control_listener(&self) -> Option<&Listener> {
        self.control_listener.as_ref()
    }

    pub fn is_serving(&self) -> bool {
        self.multiplexer.is_running()
    }

    /// One dispatch pass.
    pub fn run_once(&mut self) -> Result<usize, EngineError> {
        Ok(self.bus.run_once()?)
    }

    pub fn run(&mut self) -> Result<(), EngineError> {
        match self.bus.run() {
            Ok(()) => {
                info!(switches = self.services.switches.len(), "Controller stopped");
                EventLogger::log_event(
                    "shutdown",
                    &[KeyValue::new(
                        "switches",
                        self.services.switches.len() as i64,
                    )],
                );
                Ok(())
            }
            Err(e) => {
                if let BusError::HandlerFault { handler, fault } = &e {
                    error!(%handler, %fault, "Controller stopped by handler fault");
                    EventLogger::log_event(
                        "handler_fault",
                        &[
                            KeyValue::new("handler", handler.clone()),
                            KeyValue::new("reason", fault.to_string()),
                        ],
                    );
                }
                Err(e.into())
            }
        }
    }
}
