//! Account value object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A username/password/email identity, bindable to many sessions.
///
/// The password blob never leaves the persistence layer; this projection
/// carries only the public identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Opaque stable identifier.
    pub account_id: Uuid,
    /// Unique login name.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}
