//! The SQL-backed session store, bound to the request transaction.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::future::{BoxFuture, join_all};
use tracing::{debug, info, warn};

use wicket_core::config::ProcurerConfig;
use wicket_core::request::RequestContext;
use wicket_core::{EarlyExit, Mechanism, SessionError, SessionResult};
use wicket_entity::{Capability, CapabilityMap, Provider, Session};
use wicket_require::{InjectorFault, PrepareHook};
use wicket_session::password::PasswordEngine;
use wicket_session::procurer::SessionProcurer;
use wicket_session::store::{SessionStore, generate_identifier};

use crate::accounts::AccountSessionBinding;
use crate::connection::DatabasePool;
use crate::transaction::RequestTransaction;

/// What an SQL authorizer gets to work with: the session under
/// authorization, the ambient request transaction, and the shared
/// password engine.
pub struct SqlAuthorizerContext {
    /// The session being authorized.
    pub session: Session,
    /// The request's open transaction against the store's connectable.
    pub transaction: Arc<RequestTransaction>,
    /// The factory's password engine.
    pub engine: PasswordEngine,
}

/// An authorizer registered on the SQL store factory.
pub type SqlAuthorizer = Arc<
    dyn Fn(SqlAuthorizerContext) -> BoxFuture<'static, SessionResult<Option<Provider>>>
        + Send
        + Sync,
>;

/// Shared, immutable-after-construction factory for per-request SQL
/// stores.
///
/// The factory owns the pool, the password engine, and the authorizer
/// registry; [`SqlStoreFactory::store_for_request`] binds those to one
/// request's transaction. The [`AccountSessionBinding`] authorizer is
/// pre-registered so every session can reach account creation and login.
pub struct SqlStoreFactory {
    pool: DatabasePool,
    engine: PasswordEngine,
    authorizers: HashMap<Capability, SqlAuthorizer>,
}

impl std::fmt::Debug for SqlStoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStoreFactory")
            .field("pool", &self.pool.id())
            .field("authorizers", &self.authorizers.len())
            .finish()
    }
}

impl SqlStoreFactory {
    /// A factory with the default password engine.
    pub fn new(pool: DatabasePool) -> Self {
        Self::with_engine(pool, PasswordEngine::default())
    }

    /// A factory with an explicit password engine.
    pub fn with_engine(pool: DatabasePool, engine: PasswordEngine) -> Self {
        let factory = Self {
            pool,
            engine,
            authorizers: HashMap::new(),
        };
        factory.authorizer::<AccountSessionBinding, _, _>(|ctx| async move {
            Ok(Some(Arc::new(AccountSessionBinding::new(
                ctx.session,
                ctx.transaction,
                ctx.engine,
            ))))
        })
    }

    /// Register an authorizer producing capability `T`, replacing any
    /// previous authorizer for `T`.
    pub fn authorizer<T, F, Fut>(mut self, authorizer: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(SqlAuthorizerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SessionResult<Option<Arc<T>>>> + Send + 'static,
    {
        let erased: SqlAuthorizer = Arc::new(move |ctx| {
            let fut = authorizer(ctx);
            Box::pin(async move { Ok(fut.await?.map(|provider| provider as Provider)) })
        });
        self.authorizers.insert(Capability::of::<T>(), erased);
        self
    }

    /// The pool this factory's stores write through.
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Bind a store to the given request's transaction, opening one if
    /// this is the request's first use of the connectable.
    pub async fn store_for_request(
        self: &Arc<Self>,
        request: &Arc<RequestContext>,
    ) -> SessionResult<Arc<SqlSessionStore>> {
        let transaction = RequestTransaction::for_request(request, &self.pool).await?;
        Ok(Arc::new(SqlSessionStore {
            factory: self.clone(),
            transaction,
        }))
    }
}

/// Per-request [`SessionStore`] implementation over SQLite.
///
/// Every load, creation, purge, and authorization goes through the same
/// request transaction, so all of one request's reads and writes are
/// mutually consistent and commit together.
pub struct SqlSessionStore {
    factory: Arc<SqlStoreFactory>,
    transaction: Arc<RequestTransaction>,
}

impl std::fmt::Debug for SqlSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSessionStore")
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl SqlSessionStore {
    /// The transaction this store is bound to.
    pub fn transaction(&self) -> &Arc<RequestTransaction> {
        &self.transaction
    }

    /// Upsert the requesting peer address into the audit table.
    pub async fn record_ip(&self, session_id: &str, peer: IpAddr) -> SessionResult<()> {
        let family = if peer.is_ipv4() { "AF_INET" } else { "AF_INET6" };
        let mut guard = self.transaction.acquire().await?;
        sqlx::query(
            "INSERT INTO session_ip (session_id, ip_address, address_family, last_used) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (session_id, ip_address, address_family) \
             DO UPDATE SET last_used = excluded.last_used",
        )
        .bind(session_id)
        .bind(peer.to_string())
        .bind(family)
        .bind(Utc::now())
        .execute(&mut *guard.conn())
        .await
        .map_err(|e| SessionError::database("Failed to record session peer address", e))?;
        debug!(session_id = %session_id, ip = %peer, "recorded session peer address");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn new_session(
        &self,
        confidential: bool,
        mechanism: Mechanism,
    ) -> SessionResult<Session> {
        let identifier = generate_identifier();
        let mut guard = self.transaction.acquire().await?;
        sqlx::query("INSERT INTO session (session_id, confidential) VALUES (?1, ?2)")
            .bind(&identifier)
            .bind(confidential)
            .execute(&mut *guard.conn())
            .await
            .map_err(|e| SessionError::database("Failed to insert session", e))?;
        drop(guard);
        info!(session_id = %identifier, confidential, %mechanism, "created session");
        Ok(Session::new(identifier, confidential, mechanism))
    }

    async fn load_session(
        &self,
        identifier: &str,
        confidential: bool,
        mechanism: Mechanism,
    ) -> SessionResult<Session> {
        let mut guard = self.transaction.acquire().await?;
        let found: Option<String> = sqlx::query_scalar(
            "SELECT session_id FROM session WHERE session_id = ?1 AND confidential = ?2",
        )
        .bind(identifier)
        .bind(confidential)
        .fetch_optional(&mut *guard.conn())
        .await
        .map_err(|e| SessionError::database("Failed to load session", e))?;
        drop(guard);

        match found {
            Some(identifier) => Ok(Session::new(identifier, confidential, mechanism)),
            None => Err(SessionError::no_such_session(mechanism)),
        }
    }

    async fn sent_insecurely(&self, tokens: Vec<String>) {
        if tokens.is_empty() {
            return;
        }
        let purge = async {
            let mut guard = self.transaction.acquire().await?;
            let placeholders = vec!["?"; tokens.len()].join(", ");
            let sql = format!(
                "DELETE FROM session WHERE confidential = 1 AND session_id IN ({placeholders})"
            );
            let mut query = sqlx::query(&sql);
            for token in &tokens {
                query = query.bind(token);
            }
            query
                .execute(&mut *guard.conn())
                .await
                .map_err(|e| SessionError::database("Failed to purge disclosed sessions", e))?;
            Ok::<_, SessionError>(())
        };
        if let Err(err) = purge.await {
            // Best-effort by contract: log and move on.
            warn!(%err, "failed to purge sessions disclosed over an insecure channel");
        }
    }

    async fn authorize(
        &self,
        session: &Session,
        capabilities: &[Capability],
    ) -> SessionResult<CapabilityMap> {
        let mut requested = Vec::new();
        let mut pending = Vec::new();
        for capability in capabilities {
            if let Some(authorizer) = self.factory.authorizers.get(capability) {
                let context = SqlAuthorizerContext {
                    session: session.clone(),
                    transaction: self.transaction.clone(),
                    engine: self.factory.engine.clone(),
                };
                requested.push(*capability);
                pending.push(authorizer(context));
            } else {
                debug!(%capability, "no authorizer registered");
            }
        }

        // Fan-out/fan-in; authorizers sharing the transaction serialize
        // on its lock.
        let settled = join_all(pending).await;
        let mut map = CapabilityMap::new();
        for (capability, result) in requested.into_iter().zip(settled) {
            if let Some(provider) = result? {
                map.insert_erased(capability, provider);
            }
        }
        Ok(map)
    }
}

/// A prepare hook that binds a store to the request transaction, procures
/// a session through it, and records the requesting peer address in the
/// audit table.
///
/// Policy outcomes become early exits, as with the in-memory prerequisite:
/// `NoSuchSession` turns into a 401, `TooLateForCookies` into a 500.
pub fn sql_session_prerequisite(
    factory: Arc<SqlStoreFactory>,
    config: ProcurerConfig,
) -> PrepareHook {
    Arc::new(move |request| {
        let factory = factory.clone();
        let config = config.clone();
        Box::pin(async move {
            let store = factory.store_for_request(&request).await?;
            let procurer = SessionProcurer::new(store.clone(), config);
            match procurer.procure_session(&request, false).await {
                Ok(handle) => {
                    if let Some(peer) = request.peer() {
                        store.record_ip(&handle.session().identifier, peer).await?;
                    }
                    Ok(())
                }
                Err(SessionError::NoSuchSession { mechanism }) => {
                    warn!(%mechanism, "request has no procurable session");
                    Err(InjectorFault::Exit(EarlyExit::new(
                        (StatusCode::UNAUTHORIZED, "no valid session").into_response(),
                    )))
                }
                Err(SessionError::TooLateForCookies) => Err(InjectorFault::Exit(EarlyExit::new(
                    StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                ))),
                Err(err) => Err(InjectorFault::Failed(err)),
            }
        })
    })
}
