//! Scrypt password hashing with upgrade-on-check.

use std::future::Future;

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, info};

use wicket_core::config::PasswordConfig;
use wicket_core::{SessionError, SessionResult};

use super::record::{KEY_LENGTH, PasswordRecord};

/// Salt length in bytes.
const SALT_LENGTH: usize = 16;

/// Stateless hashing/verification strategy.
///
/// Hashing is memory-hard (scrypt) and CPU-bound, so every derivation runs
/// on the blocking pool via `tokio::task::spawn_blocking`; the event loop
/// never computes a hash inline.
#[derive(Debug, Clone)]
pub struct PasswordEngine {
    config: PasswordConfig,
}

impl PasswordEngine {
    /// Create an engine with the given cost configuration.
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    /// Produce an opaque, serializable hash record from a plaintext
    /// password, at the engine's preferred cost. Safe to store directly.
    pub async fn compute_key_text(&self, password: &str) -> SessionResult<String> {
        let mut salt = vec![0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        let record = derive_off_thread(
            password.to_string(),
            salt,
            self.config.preferred_n,
            self.config.preferred_r,
            self.config.preferred_p,
        )
        .await?;
        Ok(record.to_string())
    }

    /// Verify `provided` against the `stored` record.
    ///
    /// On a match, if the stored cost is below the engine's current minimum,
    /// a replacement record at the preferred cost is computed and handed to
    /// `store_new_hash` before `true` is returned. On a mismatch, returns
    /// `false` with no side effects.
    pub async fn check_and_reset<F, Fut>(
        &self,
        stored: &str,
        provided: &str,
        store_new_hash: F,
    ) -> SessionResult<bool>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = SessionResult<()>> + Send,
    {
        let record = PasswordRecord::parse(stored)?;

        let candidate = derive_off_thread(
            provided.to_string(),
            record.salt.clone(),
            record.n,
            record.r,
            record.p,
        )
        .await?;

        if !constant_time_eq(&candidate.hash, &record.hash) {
            debug!("password verification failed");
            return Ok(false);
        }

        if record.n < self.config.minimum_n {
            info!(
                stored_n = record.n,
                preferred_n = self.config.preferred_n,
                "upgrading stored password hash cost"
            );
            let upgraded = self.compute_key_text(provided).await?;
            store_new_hash(upgraded).await?;
        }

        Ok(true)
    }
}

impl Default for PasswordEngine {
    fn default() -> Self {
        Self::new(PasswordConfig::default())
    }
}

/// Run one scrypt derivation on the blocking pool.
async fn derive_off_thread(
    password: String,
    salt: Vec<u8>,
    n: u32,
    r: u32,
    p: u32,
) -> SessionResult<PasswordRecord> {
    tokio::task::spawn_blocking(move || derive(&password, salt, n, r, p))
        .await
        .map_err(|e| SessionError::Internal(format!("hashing task failed: {e}")))?
}

fn derive(password: &str, salt: Vec<u8>, n: u32, r: u32, p: u32) -> SessionResult<PasswordRecord> {
    if n < 2 || !n.is_power_of_two() {
        return Err(SessionError::Internal(format!(
            "scrypt cost must be a power of two >= 2, got {n}"
        )));
    }
    let log_n = n.trailing_zeros() as u8;
    let params = scrypt::Params::new(log_n, r, p, KEY_LENGTH)
        .map_err(|e| SessionError::Internal(format!("invalid scrypt parameters: {e}")))?;

    let mut hash = vec![0u8; KEY_LENGTH];
    scrypt::scrypt(password.as_bytes(), &salt, &params, &mut hash)
        .map_err(|e| SessionError::Internal(format!("scrypt derivation failed: {e}")))?;

    Ok(PasswordRecord { hash, salt, n, r, p })
}

/// Compare two derived keys without short-circuiting on the first
/// differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Low-cost configuration so tests stay fast.
    fn fast_config() -> PasswordConfig {
        PasswordConfig {
            preferred_n: 1 << 4,
            preferred_r: 8,
            preferred_p: 1,
            minimum_n: 1 << 4,
        }
    }

    #[tokio::test]
    async fn test_hash_round_trip() {
        let engine = PasswordEngine::new(fast_config());
        let stored = engine.compute_key_text("secretstuff").await.unwrap();

        let ok = engine
            .check_and_reset(&stored, "secretstuff", |_| async { Ok(()) })
            .await
            .unwrap();
        assert!(ok);

        let ok = engine
            .check_and_reset(&stored, "secretstuffx", |_| async { Ok(()) })
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_upgrade_on_correct_password() {
        // Hash at cost 2^4, then check with an engine demanding 2^5.
        let old_engine = PasswordEngine::new(fast_config());
        let stored = old_engine.compute_key_text("hunter2").await.unwrap();

        let strict = PasswordEngine::new(PasswordConfig {
            preferred_n: 1 << 5,
            preferred_r: 8,
            preferred_p: 1,
            minimum_n: 1 << 5,
        });

        let saved: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let saved_ref = &saved;
        let ok = strict
            .check_and_reset(&stored, "hunter2", |new_hash| async move {
                saved_ref.lock().unwrap().push(new_hash);
                Ok(())
            })
            .await
            .unwrap();
        assert!(ok);

        let saved = saved.into_inner().unwrap();
        assert_eq!(saved.len(), 1);
        let upgraded = PasswordRecord::parse(&saved[0]).unwrap();
        assert!(upgraded.n >= 1 << 5);

        // The upgraded record verifies, at the new cost, with no further
        // upgrade.
        let ok = strict
            .check_and_reset(&saved[0], "hunter2", |_| async {
                panic!("no second upgrade expected")
            })
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_no_upgrade_on_wrong_password() {
        let old_engine = PasswordEngine::new(fast_config());
        let stored = old_engine.compute_key_text("hunter2").await.unwrap();

        let strict = PasswordEngine::new(PasswordConfig {
            preferred_n: 1 << 5,
            preferred_r: 8,
            preferred_p: 1,
            minimum_n: 1 << 5,
        });

        let ok = strict
            .check_and_reset(&stored, "wrong", |_| async {
                panic!("store_new_hash must not run on mismatch")
            })
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_not_a_mismatch() {
        let engine = PasswordEngine::new(fast_config());
        let result = engine
            .check_and_reset("$garbage$", "anything", |_| async { Ok(()) })
            .await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidPasswordRecord(_))
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
