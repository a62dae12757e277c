//! ## vaxel-core::cleanup
//! **Shutdown cascade**
//!
//! Components that hold OS resources (listeners, socket paths, open
//! connections) register here. On shutdown or on a handler fault the
//! registry runs every component exactly once, newest first. A failing or
//! panicking component is logged and the cascade carries on.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Cleanup failed: {0}")]
    Failed(String),

    #[error("I/O error during cleanup: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that must release resources before the process exits.
pub trait Cleanup: Send {
    fn name(&self) -> &str;

    fn cleanup(&mut self) -> Result<(), CleanupError>;
}

struct FnCleanup<F> {
    name: String,
    f: Option<F>,
}

impl<F> Cleanup for FnCleanup<F>
where
    F: FnOnce() -> Result<(), CleanupError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn cleanup(&mut self) -> Result<(), CleanupError> {
        match self.f.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct Inner {
    components: Vec<Box<dyn Cleanup>>,
    done: bool,
}

/// Shared, cloneable cleanup list.
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `component` at the head of the list, so it runs before
    /// everything registered earlier.
    pub fn register(&self, component: impl Cleanup + 'static) {
        let mut inner = self.inner.lock();
        if inner.done {
            debug!(component = component.name(), "Cleanup already ran, registering anyway");
        }
        inner.components.insert(0, Box::new(component));
    }

    pub fn register_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: FnOnce() -> Result<(), CleanupError> + Send + 'static,
    {
        self.register(FnCleanup {
            name: name.into(),
            f: Some(f),
        });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_run(&self) -> bool {
        self.inner.lock().done
    }

    /// Runs the cascade. Later calls are no-ops.
    pub fn cleanup_all(&self) {
        let components = {
            let mut inner = self.inner.lock();
            if inner.done {
                return;
            }
            inner.done = true;
            std::mem::take(&mut inner.components)
        };

        info!(components = components.len(), "Running cleanup cascade");
        for mut component in components {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| component.cleanup()));
            match outcome {
                Ok(Ok(())) => debug!(component = component.name(), "Cleaned up"),
                Ok(Err(e)) => error!(component = component.name(), error = %e, "Cleanup failed"),
                Err(_) => error!(component = component.name(), "Cleanup panicked"),
            }
        }
    }
}
