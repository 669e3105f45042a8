//! Shutdown coordination for the server.

use crate::context::{CallContext, CancelGuard};

/// Coordinator for graceful shutdown.
///
/// Wraps a root [`CallContext`]; every connection and call context the server
/// creates is derived from it, so triggering shutdown cancels them all.
#[derive(Debug, Clone)]
pub struct Shutdown {
    root: CallContext,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            root: CallContext::background(),
        }
    }

    /// The root context servers derive from.
    pub fn context(&self) -> CallContext {
        self.root.clone()
    }

    /// A child of the root context with its own cancel guard.
    pub fn child(&self) -> (CallContext, CancelGuard) {
        self.root.with_cancel()
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        if !self.root.is_done() {
            tracing::info!("Shutdown triggered");
        }
        self.root.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_done()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&self) {
        self.root.done().await
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
