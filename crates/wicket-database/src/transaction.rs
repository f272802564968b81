//! Request-scoped transaction binding.
//!
//! The first component of a request that needs the database gets a
//! transaction opened for it; everyone else in the same request asking for
//! the same connectable shares that transaction, and it is committed
//! exactly once when the request's finish hooks run. Different
//! connectables within one request get independent transactions that
//! commit independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use wicket_core::request::RequestContext;
use wicket_core::{SessionError, SessionResult};

use crate::connection::DatabasePool;

type Slot = Arc<AsyncMutex<Option<Transaction<'static, Sqlite>>>>;

/// The per-request map of open transactions, keyed by connectable
/// identity. Stored as a request component; owned exclusively by the one
/// request's task chain, which runs its prepare hooks and injectors
/// sequentially.
#[derive(Default)]
struct TransactionMap {
    open: Mutex<HashMap<Uuid, Arc<RequestTransaction>>>,
}

/// One open transaction shared by everything in a request that touches
/// the same connectable.
pub struct RequestTransaction {
    pool_id: Uuid,
    slot: Slot,
}

impl std::fmt::Debug for RequestTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTransaction")
            .field("pool_id", &self.pool_id)
            .finish()
    }
}

impl RequestTransaction {
    /// Get or open the request's transaction against `pool`.
    ///
    /// The first call per request per connectable begins a transaction
    /// and registers a finish hook that commits it; subsequent calls
    /// return the same transaction. If the request never finishes (the
    /// client disconnected), the commit never runs and the driver rolls
    /// the transaction back when its connection returns to the pool.
    pub async fn for_request(
        request: &Arc<RequestContext>,
        pool: &DatabasePool,
    ) -> SessionResult<Arc<RequestTransaction>> {
        let map = match request.component::<TransactionMap>() {
            Some(map) => map,
            None => {
                request.set_component(TransactionMap::default());
                request.component::<TransactionMap>().ok_or_else(|| {
                    SessionError::Internal("transaction map vanished from request".to_string())
                })?
            }
        };

        if let Some(existing) = map
            .open
            .lock()
            .expect("transaction map poisoned")
            .get(&pool.id())
        {
            debug!(pool = %pool.id(), "reusing request transaction");
            return Ok(existing.clone());
        }

        let tx = pool
            .pool()
            .begin()
            .await
            .map_err(|e| SessionError::database("Failed to begin transaction", e))?;
        let slot: Slot = Arc::new(AsyncMutex::new(Some(tx)));
        let transaction = Arc::new(RequestTransaction {
            pool_id: pool.id(),
            slot: slot.clone(),
        });

        {
            // The map was unlocked while `begin` was in flight; a
            // concurrent caller may have bound a transaction for this
            // connectable in the meantime. Re-check before publishing so
            // the request holds at most one; the loser's transaction is
            // dropped and rolled back by the driver.
            let mut open = map.open.lock().expect("transaction map poisoned");
            if let Some(existing) = open.get(&pool.id()) {
                debug!(pool = %pool.id(), "discarding duplicate request transaction");
                return Ok(existing.clone());
            }

            let pool_id = pool.id();
            request.on_finish(Box::new(move || {
                Box::pin(async move {
                    let mut slot = slot.lock().await;
                    if let Some(tx) = slot.take() {
                        tx.commit().await.map_err(|e| {
                            SessionError::database("Failed to commit request transaction", e)
                        })?;
                        info!(pool = %pool_id, "request transaction committed");
                    }
                    Ok(())
                })
            }))?;
            open.insert(pool.id(), transaction.clone());
        }
        debug!(pool = %pool.id(), "opened request transaction");
        Ok(transaction)
    }

    /// Lock the transaction for a sequence of statements.
    ///
    /// Fails with [`SessionError::TransactionCompleted`] once the commit
    /// hook has run. The guard must not be held across a call that itself
    /// acquires the same transaction.
    pub async fn acquire(&self) -> SessionResult<TransactionGuard> {
        let guard = self.slot.clone().lock_owned().await;
        if guard.is_none() {
            return Err(SessionError::TransactionCompleted);
        }
        Ok(TransactionGuard { guard })
    }
}

/// Exclusive access to the request transaction's connection.
pub struct TransactionGuard {
    guard: OwnedMutexGuard<Option<Transaction<'static, Sqlite>>>,
}

impl TransactionGuard {
    /// The live connection behind the transaction.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        // Checked non-empty at acquire time; the commit hook cannot take
        // the transaction while this guard holds the lock.
        self.guard
            .as_mut()
            .map(|tx| &mut **tx)
            .expect("transaction taken while guarded")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use wicket_core::config::DatabaseConfig;

    async fn memory_pool() -> DatabasePool {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            acquire_timeout_seconds: 5,
        };
        let pool = DatabasePool::connect(&config).await.unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER)")
            .execute(pool.pool())
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_same_connectable_shares_one_transaction() {
        let pool = memory_pool().await;
        let request = RequestContext::builder().build();

        let first = RequestTransaction::for_request(&request, &pool).await.unwrap();
        let second = RequestTransaction::for_request(&request, &pool).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // A clone of the pool is the same connectable.
        let third = RequestTransaction::for_request(&request, &pool.clone())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_binds_one_transaction() {
        // A file-backed pool hands out multiple connections, so two
        // callers can both reach `begin` before either publishes; one of
        // the two transactions must win and the other be discarded.
        let path = std::env::temp_dir().join(format!("wicket-txn-{}.db", Uuid::new_v4()));
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 4,
            acquire_timeout_seconds: 5,
        };
        let pool = DatabasePool::connect(&config).await.unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER)")
            .execute(pool.pool())
            .await
            .unwrap();
        let request = RequestContext::builder().build();

        let (first, second) = tokio::join!(
            RequestTransaction::for_request(&request, &pool),
            RequestTransaction::for_request(&request, &pool),
        );
        let first = first.unwrap();
        let second = second.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        {
            let mut guard = first.acquire().await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (7)")
                .execute(&mut *guard.conn())
                .await
                .unwrap();
        }
        request.finish().await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(pool.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_commit_on_finish_makes_writes_visible() {
        let pool = memory_pool().await;

        let request = RequestContext::builder().build();
        let tx = RequestTransaction::for_request(&request, &pool).await.unwrap();
        {
            let mut guard = tx.acquire().await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (42)")
                .execute(&mut *guard.conn())
                .await
                .unwrap();
        }
        request.finish().await.unwrap();

        let v: i32 = sqlx::query_scalar("SELECT v FROM t")
            .fetch_one(pool.pool())
            .await
            .unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn test_acquire_after_commit_fails() {
        let pool = memory_pool().await;
        let request = RequestContext::builder().build();
        let tx = RequestTransaction::for_request(&request, &pool).await.unwrap();
        request.finish().await.unwrap();

        assert!(matches!(
            tx.acquire().await,
            Err(SessionError::TransactionCompleted)
        ));
    }

    #[tokio::test]
    async fn test_different_connectables_commit_independently() {
        let pool_a = memory_pool().await;
        let pool_b = memory_pool().await;
        let request = RequestContext::builder().build();

        let tx_a = RequestTransaction::for_request(&request, &pool_a).await.unwrap();
        let tx_b = RequestTransaction::for_request(&request, &pool_b).await.unwrap();
        assert!(!Arc::ptr_eq(&tx_a, &tx_b));

        {
            let mut guard = tx_a.acquire().await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (1)")
                .execute(&mut *guard.conn())
                .await
                .unwrap();
        }
        {
            let mut guard = tx_b.acquire().await.unwrap();
            sqlx::query("INSERT INTO t (v) VALUES (2)")
                .execute(&mut *guard.conn())
                .await
                .unwrap();
        }
        request.finish().await.unwrap();

        let a: i32 = sqlx::query_scalar("SELECT v FROM t")
            .fetch_one(pool_a.pool())
            .await
            .unwrap();
        let b: i32 = sqlx::query_scalar("SELECT v FROM t")
            .fetch_one(pool_b.pool())
            .await
            .unwrap();
        assert_eq!((a, b), (1, 2));
    }
}
