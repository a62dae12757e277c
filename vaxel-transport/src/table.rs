//! Connection table shared between the I/O thread, which inserts and
//! removes entries, and the dispatch loop, which looks links up to send.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::link::{ConnId, Link};

#[derive(Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<RwLock<HashMap<ConnId, Link>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, link: Link) {
        self.inner.write().insert(link.id(), link);
    }

    pub fn remove(&self, id: ConnId) -> Option<Link> {
        self.inner.write().remove(&id)
    }

    pub fn get(&self, id: ConnId) -> Option<Link> {
        self.inner.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Open connections in id order.
    pub fn ids(&self) -> Vec<ConnId> {
        let mut ids: Vec<_> = self.inner.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Drops every link, closing their write queues.
    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
