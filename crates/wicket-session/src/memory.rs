//! In-memory session store.
//!
//! Holds sessions in a single map guarded by a mutex; the confidentiality
//! partition is the stored flag, and a lookup that crosses the partition
//! boundary evicts the stale record before failing. Suitable for tests and
//! single-process deployments with no persistence requirement.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::{BoxFuture, join_all};
use tracing::{debug, info};

use wicket_core::{Mechanism, SessionError, SessionResult};
use wicket_entity::{Capability, CapabilityMap, Provider, Session};

use crate::store::{SessionStore, generate_identifier};

/// An authorizer registered on the memory store: given the session, may
/// produce a provider for its declared capability.
pub type MemoryAuthorizer =
    Arc<dyn Fn(Session) -> BoxFuture<'static, SessionResult<Option<Provider>>> + Send + Sync>;

/// In-memory [`SessionStore`] implementation.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    authorizers: HashMap<Capability, MemoryAuthorizer>,
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("authorizers", &self.authorizers.len())
            .finish()
    }
}

impl MemorySessionStore {
    /// Start building a store.
    pub fn builder() -> MemorySessionStoreBuilder {
        MemorySessionStoreBuilder::default()
    }

    /// A store with no registered authorizers.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn new_session(
        &self,
        confidential: bool,
        mechanism: Mechanism,
    ) -> SessionResult<Session> {
        let session = Session::new(generate_identifier(), confidential, mechanism);
        self.sessions
            .lock()
            .expect("session map poisoned")
            .insert(session.identifier.clone(), session.clone());
        info!(confidential, %mechanism, "created in-memory session");
        Ok(session)
    }

    async fn load_session(
        &self,
        identifier: &str,
        confidential: bool,
        mechanism: Mechanism,
    ) -> SessionResult<Session> {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        match sessions.get(identifier) {
            None => Err(SessionError::no_such_session(mechanism)),
            Some(stored) if stored.confidential != confidential => {
                // A token that crossed the confidentiality boundary is
                // stale at best and leaked at worst; evict it.
                sessions.remove(identifier);
                debug!("evicted session on confidentiality mismatch");
                Err(SessionError::no_such_session(mechanism))
            }
            Some(stored) => Ok(Session::new(
                stored.identifier.clone(),
                stored.confidential,
                mechanism,
            )),
        }
    }

    async fn sent_insecurely(&self, tokens: Vec<String>) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        for token in tokens {
            if sessions.get(&token).is_some_and(|s| s.confidential) {
                sessions.remove(&token);
                info!("dropped confidential session observed on an insecure channel");
            }
        }
    }

    async fn authorize(
        &self,
        session: &Session,
        capabilities: &[Capability],
    ) -> SessionResult<CapabilityMap> {
        let selected: Vec<(Capability, MemoryAuthorizer)> = capabilities
            .iter()
            .filter_map(|cap| self.authorizers.get(cap).map(|a| (*cap, a.clone())))
            .collect();

        let futures = selected
            .iter()
            .map(|(_, authorizer)| authorizer(session.clone()));
        let settled = join_all(futures).await;

        let mut map = CapabilityMap::new();
        for ((capability, _), outcome) in selected.iter().zip(settled) {
            if let Some(provider) = outcome? {
                map.insert_erased(*capability, provider);
            }
        }
        Ok(map)
    }
}

/// Builder accumulating authorizer registrations.
#[derive(Default)]
pub struct MemorySessionStoreBuilder {
    authorizers: HashMap<Capability, MemoryAuthorizer>,
}

impl MemorySessionStoreBuilder {
    /// Register an authorizer producing capability type `T`.
    ///
    /// A later registration for the same capability replaces the earlier
    /// one.
    pub fn authorizer<T, F, Fut>(mut self, authorizer: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SessionResult<Option<Arc<T>>>> + Send + 'static,
    {
        let erased: MemoryAuthorizer = Arc::new(move |session| {
            let fut = authorizer(session);
            Box::pin(async move { fut.await.map(|opt| opt.map(|arc| arc as Provider)) })
        });
        self.authorizers.insert(Capability::of::<T>(), erased);
        self
    }

    /// Finish building.
    pub fn build(self) -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore {
            sessions: Mutex::new(HashMap::new()),
            authorizers: self.authorizers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Critic {
        name: &'static str,
    }

    struct Publisher;

    #[tokio::test]
    async fn test_new_then_load_same_partition() {
        let store = MemorySessionStore::new();
        let s1 = store.new_session(true, Mechanism::Header).await.unwrap();

        let loaded = store
            .load_session(&s1.identifier, true, Mechanism::Header)
            .await
            .unwrap();
        assert_eq!(loaded.identifier, s1.identifier);
    }

    #[tokio::test]
    async fn test_confidentiality_partitioning_and_eviction() {
        let store = MemorySessionStore::new();
        let s1 = store.new_session(true, Mechanism::Header).await.unwrap();

        // Cross-partition lookup fails...
        let err = store
            .load_session(&s1.identifier, false, Mechanism::Header)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoSuchSession { .. }));

        // ...and evicts, so even the correct partition no longer finds it.
        let err = store
            .load_session(&s1.identifier, true, Mechanism::Header)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoSuchSession { .. }));
    }

    #[tokio::test]
    async fn test_sent_insecurely_only_kills_confidential() {
        let store = MemorySessionStore::new();
        let secure = store.new_session(true, Mechanism::Cookie).await.unwrap();
        let insecure = store.new_session(false, Mechanism::Cookie).await.unwrap();

        store
            .sent_insecurely(vec![
                secure.identifier.clone(),
                insecure.identifier.clone(),
                "unknown-token".to_string(),
            ])
            .await;

        assert!(
            store
                .load_session(&secure.identifier, true, Mechanism::Cookie)
                .await
                .is_err()
        );
        assert!(
            store
                .load_session(&insecure.identifier, false, Mechanism::Cookie)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_authorize_fan_out_returns_only_produced() {
        let store = MemorySessionStore::builder()
            .authorizer::<Critic, _, _>(|_session| async {
                Ok(Some(Arc::new(Critic { name: "reviewer" })))
            })
            .authorizer::<Publisher, _, _>(|_session| async { Ok(None) })
            .build();

        let session = store.new_session(true, Mechanism::Header).await.unwrap();

        // Publisher authorizer denies; an unrelated capability is simply
        // unregistered. Only Critic comes back.
        struct Unregistered;
        let map = store
            .authorize(
                &session,
                &[
                    Capability::of::<Critic>(),
                    Capability::of::<Publisher>(),
                    Capability::of::<Unregistered>(),
                ],
            )
            .await
            .unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.get::<Critic>().unwrap().name, "reviewer");
        assert!(map.get::<Publisher>().is_none());
    }

    #[tokio::test]
    async fn test_authorize_nothing_registered() {
        let store = MemorySessionStore::new();
        let session = store.new_session(false, Mechanism::Cookie).await.unwrap();
        struct Anything;
        let map = store
            .authorize(&session, &[Capability::of::<Anything>()])
            .await
            .unwrap();
        assert!(map.is_empty());
    }
}
