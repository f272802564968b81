//! The procured-session facade stored on the request.

use std::any::Any;
use std::sync::Arc;

use wicket_core::SessionResult;
use wicket_entity::{Capability, CapabilityMap, Session};

use crate::store::SessionStore;

/// A procured session plus the store that produced it.
///
/// This is what the procurer caches as a request component: the session
/// value itself is immutable, and authorization goes back through the
/// owning store (for the SQL backend, through the same request
/// transaction).
#[derive(Clone)]
pub struct SessionHandle {
    session: Session,
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &self.session)
            .finish()
    }
}

impl SessionHandle {
    /// Pair a session value with its store.
    pub fn new(session: Session, store: Arc<dyn SessionStore>) -> Self {
        Self { session, store }
    }

    /// The session value.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolve the requested capabilities for this session.
    pub async fn authorize(&self, capabilities: &[Capability]) -> SessionResult<CapabilityMap> {
        self.store.authorize(&self.session, capabilities).await
    }

    /// Convenience: resolve a single capability type.
    pub async fn authorize_one<T: Any + Send + Sync>(&self) -> SessionResult<Option<Arc<T>>> {
        let map = self.authorize(&[Capability::of::<T>()]).await?;
        Ok(map.get::<T>())
    }
}
