//! Account creation, credential binding, and password lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::{info, warn};
use uuid::Uuid;

use wicket_core::{SessionError, SessionResult};
use wicket_entity::{Account, Session};
use wicket_session::PasswordEngine;

use crate::connection::is_unique_violation;
use crate::transaction::RequestTransaction;

/// Row projection including the private password blob. Never leaves this
/// module; callers get the public [`Account`] value.
#[derive(Debug, FromRow)]
struct AccountRow {
    account_id: String,
    username: String,
    email: String,
    password_blob: String,
    created_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> SessionResult<Account> {
        let account_id = Uuid::parse_str(&self.account_id).map_err(|e| {
            SessionError::Internal(format!("corrupt account_id in database: {e}"))
        })?;
        Ok(Account {
            account_id,
            username: self.username,
            email: self.email,
            created_at: self.created_at,
        })
    }
}

/// The capability every session gets by default: create accounts, log in,
/// inspect and sever account bindings, change passwords.
///
/// All operations run inside the request transaction the binding was
/// authorized under, so a login and its hash upgrade commit (or vanish)
/// together.
pub struct AccountSessionBinding {
    session: Session,
    transaction: Arc<RequestTransaction>,
    engine: PasswordEngine,
}

impl std::fmt::Debug for AccountSessionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSessionBinding")
            .field("session", &self.session.identifier)
            .finish()
    }
}

impl AccountSessionBinding {
    /// Bind the capability to a session and its transaction.
    pub fn new(
        session: Session,
        transaction: Arc<RequestTransaction>,
        engine: PasswordEngine,
    ) -> Self {
        Self {
            session,
            transaction,
            engine,
        }
    }

    /// The session this binding was authorized for.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Create a new account.
    ///
    /// Returns `Ok(None)` when the username is already taken; a duplicate
    /// is an ordinary outcome here, never a driver error.
    pub async fn create_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> SessionResult<Option<Account>> {
        let blob = self.engine.compute_key_text(password).await?;
        let account_id = Uuid::new_v4();
        let created_at = Utc::now();

        let mut guard = self.transaction.acquire().await?;
        let inserted = sqlx::query(
            "INSERT INTO account (account_id, username, email, password_blob, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(account_id.to_string())
        .bind(username)
        .bind(email)
        .bind(&blob)
        .bind(created_at)
        .execute(&mut *guard.conn())
        .await;
        drop(guard);

        match inserted {
            Ok(_) => {
                info!(%account_id, username, "created account");
                Ok(Some(Account {
                    account_id,
                    username: username.to_string(),
                    email: email.to_string(),
                    created_at,
                }))
            }
            Err(err) if is_unique_violation(&err) => {
                warn!(username, "account creation refused: username taken");
                Ok(None)
            }
            Err(err) => Err(SessionError::database("Failed to create account", err)),
        }
    }

    /// Verify credentials and, on a match, bind the account to this
    /// session.
    ///
    /// Returns `Ok(None)` for an unknown username or a wrong password. A
    /// matching password hashed at a below-minimum cost is transparently
    /// rewritten at the preferred cost inside the same transaction.
    pub async fn bind_if_credentials_match(
        &self,
        username: &str,
        password: &str,
    ) -> SessionResult<Option<Account>> {
        let row = {
            let mut guard = self.transaction.acquire().await?;
            sqlx::query_as::<_, AccountRow>(
                "SELECT account_id, username, email, password_blob, created_at \
                 FROM account WHERE username = ?1",
            )
            .bind(username)
            .fetch_optional(&mut *guard.conn())
            .await
            .map_err(|e| SessionError::database("Failed to look up account", e))?
        };
        let Some(row) = row else {
            warn!(username, "login refused: no such account");
            return Ok(None);
        };

        // The transaction lock is released while scrypt runs; the upgrade
        // callback re-acquires it for the in-transaction rewrite.
        let transaction = self.transaction.clone();
        let account_id = row.account_id.clone();
        let matched = self
            .engine
            .check_and_reset(&row.password_blob, password, move |new_blob| async move {
                let mut guard = transaction.acquire().await?;
                sqlx::query("UPDATE account SET password_blob = ?1 WHERE account_id = ?2")
                    .bind(&new_blob)
                    .bind(&account_id)
                    .execute(&mut *guard.conn())
                    .await
                    .map_err(|e| {
                        SessionError::database("Failed to store upgraded password hash", e)
                    })?;
                info!(account_id = %account_id, "rewrote password hash at upgraded cost");
                Ok(())
            })
            .await?;

        if !matched {
            warn!(username, "login refused: password mismatch");
            return Ok(None);
        }

        let mut guard = self.transaction.acquire().await?;
        sqlx::query(
            "INSERT INTO session_account (account_id, session_id) VALUES (?1, ?2) \
             ON CONFLICT (account_id, session_id) DO NOTHING",
        )
        .bind(&row.account_id)
        .bind(&self.session.identifier)
        .execute(&mut *guard.conn())
        .await
        .map_err(|e| SessionError::database("Failed to bind account to session", e))?;
        drop(guard);

        info!(username, session_id = %self.session.identifier, "bound account to session");
        row.into_account().map(Some)
    }

    /// [`AccountSessionBinding::bind_if_credentials_match`], under its
    /// conversational name.
    pub async fn log_in(
        &self,
        username: &str,
        password: &str,
    ) -> SessionResult<Option<Account>> {
        self.bind_if_credentials_match(username, password).await
    }

    /// All accounts currently bound to this session.
    pub async fn bound_accounts(&self) -> SessionResult<Vec<Account>> {
        let mut guard = self.transaction.acquire().await?;
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT a.account_id, a.username, a.email, a.password_blob, a.created_at \
             FROM account a \
             JOIN session_account sa ON sa.account_id = a.account_id \
             WHERE sa.session_id = ?1",
        )
        .bind(&self.session.identifier)
        .fetch_all(&mut *guard.conn())
        .await
        .map_err(|e| SessionError::database("Failed to list bound accounts", e))?;
        drop(guard);

        rows.into_iter().map(AccountRow::into_account).collect()
    }

    /// Sever every account binding on this session (log out).
    pub async fn unbind_this_session(&self) -> SessionResult<()> {
        let mut guard = self.transaction.acquire().await?;
        sqlx::query("DELETE FROM session_account WHERE session_id = ?1")
            .bind(&self.session.identifier)
            .execute(&mut *guard.conn())
            .await
            .map_err(|e| SessionError::database("Failed to unbind session", e))?;
        drop(guard);
        info!(session_id = %self.session.identifier, "unbound all accounts from session");
        Ok(())
    }

    /// Replace an account's password with a fresh hash at the preferred
    /// cost.
    pub async fn change_password(
        &self,
        account: &Account,
        new_password: &str,
    ) -> SessionResult<()> {
        let blob = self.engine.compute_key_text(new_password).await?;
        let mut guard = self.transaction.acquire().await?;
        let result = sqlx::query("UPDATE account SET password_blob = ?1 WHERE account_id = ?2")
            .bind(&blob)
            .bind(account.account_id.to_string())
            .execute(&mut *guard.conn())
            .await
            .map_err(|e| SessionError::database("Failed to change password", e))?;
        drop(guard);

        if result.rows_affected() == 0 {
            return Err(SessionError::Internal(format!(
                "password change for unknown account {}",
                account.account_id
            )));
        }
        info!(account_id = %account.account_id, "changed account password");
        Ok(())
    }
}
