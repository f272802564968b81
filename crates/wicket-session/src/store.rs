//! The backend-agnostic session persistence and authorization contract.

use async_trait::async_trait;
use rand::RngCore;
use rand::rngs::OsRng;

use wicket_core::{Mechanism, SessionResult};
use wicket_entity::{Capability, CapabilityMap, Session};

/// Backend-agnostic persistence and authorization resolution for sessions.
///
/// Both implementations (in-memory and SQL-transactional) satisfy this
/// contract identically; the SQL backend additionally binds every operation
/// to the ambient per-request transaction.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Allocate a new globally-unique, unguessable identifier, persist it,
    /// and return the session value.
    async fn new_session(
        &self,
        confidential: bool,
        mechanism: Mechanism,
    ) -> SessionResult<Session>;

    /// Load an existing session.
    ///
    /// Fails with `NoSuchSession` when the identifier is unknown, or when
    /// it is known but its confidentiality partition does not match the
    /// lookup: a confidential lookup must never resolve a non-confidential
    /// record, and vice versa.
    async fn load_session(
        &self,
        identifier: &str,
        confidential: bool,
        mechanism: Mechanism,
    ) -> SessionResult<Session>;

    /// Report that the given tokens were observed on an insecure channel.
    ///
    /// Best-effort: deletes the tokens from the confidential partition only,
    /// as a defense against disclosure. Never fails; backends log and
    /// swallow storage errors.
    async fn sent_insecurely(&self, tokens: Vec<String>);

    /// Resolve the requested capabilities for a session.
    ///
    /// Invokes, concurrently, only the registered authorizers matching the
    /// requested set, and returns a map containing only the entries that
    /// were actually produced. Unregistered or denying capabilities are
    /// simply absent, not errors.
    async fn authorize(
        &self,
        session: &Session,
        capabilities: &[Capability],
    ) -> SessionResult<CapabilityMap>;
}

/// Generate a fresh session identifier: 32 random bytes (256 bits of
/// entropy) from the OS generator, hex-encoded.
pub fn generate_identifier() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identifier_entropy_and_shape() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let id = generate_identifier();
            assert_eq!(id.len(), 64);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(seen.insert(id), "identifier reused");
        }
    }
}
