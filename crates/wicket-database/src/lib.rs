//! # wicket-database
//!
//! SQLite persistence for Wicket sessions: the connection pool wrapper,
//! schema migrations, request-scoped transaction binding, the SQL-backed
//! [`SessionStore`](wicket_session::SessionStore) implementation, and the
//! account-binding capability with its password lifecycle.
//!
//! ## Modules
//!
//! - `connection` — the [`DatabasePool`] wrapper
//! - `migration` — sqlx migration runner
//! - `transaction` — per-request, commit-on-finish transactions
//! - `store` — the factory, the per-request store, the SQL prerequisite
//! - `accounts` — account creation, login, binding, password changes

pub mod accounts;
pub mod connection;
pub mod migration;
pub mod store;
pub mod transaction;

pub use accounts::AccountSessionBinding;
pub use connection::DatabasePool;
pub use store::{SqlAuthorizerContext, SqlSessionStore, SqlStoreFactory, sql_session_prerequisite};
pub use transaction::{RequestTransaction, TransactionGuard};
