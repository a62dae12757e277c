//! Default entries installed on every switch as it connects.

use std::sync::Arc;

use tracing::debug;
use vaxel_core::events::{Context, Handler, HandlerFault, Propagation};
use vaxel_engine::{ControllerEvent, Services};
use vaxel_protocols::openflow::FlowModCommand;
use vaxel_protocols::FlowEntry;

pub struct DefaultEntries {
    services: Arc<Services>,
    entries: Vec<FlowEntry>,
}

impl DefaultEntries {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, entry: FlowEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[FlowEntry] {
        &self.entries
    }
}

impl Handler<ControllerEvent> for DefaultEntries {
    fn name(&self) -> &str {
        "default_entries"
    }

    fn handle(
        &mut self,
        event: &ControllerEvent,
        _ctx: &mut Context<'_, ControllerEvent>,
    ) -> Result<Propagation, HandlerFault> {
        if let ControllerEvent::FeaturesReply(event) = event {
            debug!(
                dpid = %format!("{:#x}", event.dpid),
                count = self.entries.len(),
                "Installing default entries"
            );
            for entry in &self.entries {
                self.services.send(
                    event.conn,
                    entry.render_install(FlowModCommand::Add, self.services.next_xid()),
                );
            }
        }
        Ok(Propagation::Continue)
    }
}
