//! Ordered handler lists per event kind.

use std::collections::HashMap;

use super::{EventError, EventKind, HandlerId};

/// Maps each kind to the handlers interested in it, in dispatch order.
#[derive(Debug, Default)]
pub struct HandlerTable {
    kinds: HashMap<EventKind, Vec<HandlerId>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the end of `kind`'s list.
    pub fn register(&mut self, kind: EventKind, handler: HandlerId) {
        self.kinds.entry(kind).or_default().push(handler);
    }

    /// Moves `earlier` to sit immediately before `later`.
    ///
    /// Nothing moves when `earlier` already precedes `later`. Elements are
    /// only relocated, never added or removed.
    pub fn reorder(
        &mut self,
        kind: &EventKind,
        earlier: HandlerId,
        later: HandlerId,
    ) -> Result<(), EventError> {
        let handlers = self
            .kinds
            .get_mut(kind)
            .ok_or_else(|| EventError::UnknownKind(kind.to_string()))?;

        let position = |id: HandlerId| {
            handlers
                .iter()
                .position(|h| *h == id)
                .ok_or_else(|| EventError::NotRegistered {
                    kind: kind.to_string(),
                    handler: id,
                })
        };
        let earlier_index = position(earlier)?;
        let later_index = position(later)?;

        if later_index < earlier_index {
            let moved = handlers.remove(earlier_index);
            handlers.insert(later_index, moved);
        }
        Ok(())
    }

    pub fn handlers_for(&self, kind: &EventKind) -> Option<&[HandlerId]> {
        self.kinds.get(kind).map(Vec::as_slice)
    }

    /// Kinds in name order, for stable diagnostics.
    pub fn kinds(&self) -> Vec<&EventKind> {
        let mut kinds: Vec<_> = self.kinds.keys().collect();
        kinds.sort();
        kinds
    }
}
