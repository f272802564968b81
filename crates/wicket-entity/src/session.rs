//! Session identity value object.

use serde::{Deserialize, Serialize};
use wicket_core::Mechanism;

/// Identity record for one browsing/API session.
///
/// Immutable after creation: stores hand out independent values and never
/// mutate a session in place. The identifier is opaque and unguessable
/// (256 bits of entropy) and is never reused across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unguessable identifier, unique across both partitions.
    pub identifier: String,
    /// Whether this session was negotiated over an encrypted transport.
    /// Confidential and non-confidential sessions live in separate storage
    /// partitions and never resolve across the boundary.
    pub confidential: bool,
    /// How the client transmitted (or will transmit) the token.
    pub mechanism: Mechanism,
}

impl Session {
    /// Construct a session value.
    pub fn new(identifier: impl Into<String>, confidential: bool, mechanism: Mechanism) -> Self {
        Self {
            identifier: identifier.into(),
            confidential,
            mechanism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_round_trip() {
        let session = Session::new("abc123", true, Mechanism::Header);
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
