//! The per-route list of prepare hooks.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use wicket_core::request::RequestContext;

use crate::injector::InjectorFault;

/// A per-request setup step guaranteed to run before any injector
/// resolution (typically: procure a session, open a transaction).
pub type PrepareHook =
    Arc<dyn Fn(Arc<RequestContext>) -> BoxFuture<'static, Result<(), InjectorFault>> + Send + Sync>;

/// The ordered prepare hooks for one compiled route.
///
/// Built once at route-compilation time and reused, immutable, across all
/// requests for that route. Hooks run strictly in registration order; no
/// topological sorting happens, so callers must register prerequisites in
/// dependency order.
#[derive(Default)]
pub struct RequestLifecycle {
    hooks: Vec<PrepareHook>,
}

impl RequestLifecycle {
    /// Empty lifecycle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook.
    pub fn add_prepare_hook(&mut self, hook: PrepareHook) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in order, stopping at the first fault.
    pub async fn run(&self, request: &Arc<RequestContext>) -> Result<(), InjectorFault> {
        debug!(hooks = self.hooks.len(), "running prepare hooks");
        for hook in &self.hooks {
            hook(request.clone()).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RequestLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLifecycle")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
