//! The self-describing serialized password hash record.
//!
//! Format: `$<algorithm-tag>$<hash-hex>$<salt-hex>$<n>$<r>$<p>$`. The KDF
//! parameters travel inside the record, so verification reconstructs the
//! exact cost that produced a stored hash and upgrade decisions compare
//! recorded cost against the engine's current minimum.

use std::fmt;

use wicket_core::{SessionError, SessionResult};

/// Tag identifying the current record version.
pub const ALGORITHM_TAG: &str = "wicket-scrypt-v1";

/// Derived key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// A parsed password hash record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecord {
    /// The derived key.
    pub hash: Vec<u8>,
    /// The random salt.
    pub salt: Vec<u8>,
    /// CPU/memory cost (N). Always a power of two.
    pub n: u32,
    /// Block size (r).
    pub r: u32,
    /// Parallelization (p).
    pub p: u32,
}

impl PasswordRecord {
    /// Parse a serialized record.
    ///
    /// Malformed input is a distinguishable [`SessionError::InvalidPasswordRecord`],
    /// never a silent verification failure: a corrupt stored blob must not be
    /// conflated with a wrong password.
    pub fn parse(text: &str) -> SessionResult<Self> {
        let parts: Vec<&str> = text.split('$').collect();
        // "$tag$hash$salt$n$r$p$" splits into 8 parts with empty ends.
        if parts.len() != 8 || !parts[0].is_empty() || !parts[7].is_empty() {
            return Err(malformed("wrong field count"));
        }
        if parts[1] != ALGORITHM_TAG {
            return Err(malformed(&format!("unknown algorithm tag {:?}", parts[1])));
        }

        let hash = hex::decode(parts[2]).map_err(|_| malformed("hash is not hex"))?;
        let salt = hex::decode(parts[3]).map_err(|_| malformed("salt is not hex"))?;
        let n: u32 = parts[4].parse().map_err(|_| malformed("n is not an integer"))?;
        let r: u32 = parts[5].parse().map_err(|_| malformed("r is not an integer"))?;
        let p: u32 = parts[6].parse().map_err(|_| malformed("p is not an integer"))?;

        if n < 2 || !n.is_power_of_two() {
            return Err(malformed("n must be a power of two >= 2"));
        }
        if r == 0 || p == 0 {
            return Err(malformed("r and p must be nonzero"));
        }

        Ok(Self { hash, salt, n, r, p })
    }

    /// log2 of the cost parameter, as the KDF implementation wants it.
    pub fn log_n(&self) -> u8 {
        self.n.trailing_zeros() as u8
    }
}

impl fmt::Display for PasswordRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}${}${}${}${}${}$",
            ALGORITHM_TAG,
            hex::encode(&self.hash),
            hex::encode(&self.salt),
            self.n,
            self.r,
            self.p
        )
    }
}

fn malformed(reason: &str) -> SessionError {
    SessionError::InvalidPasswordRecord(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PasswordRecord {
        PasswordRecord {
            hash: vec![0xde, 0xad, 0xbe, 0xef],
            salt: vec![0x01, 0x02],
            n: 1 << 14,
            r: 8,
            p: 1,
        }
    }

    #[test]
    fn test_round_trip() {
        let record = sample();
        let text = record.to_string();
        assert_eq!(text, "$wicket-scrypt-v1$deadbeef$0102$16384$8$1$");
        assert_eq!(PasswordRecord::parse(&text).unwrap(), record);
    }

    #[test]
    fn test_malformed_records_are_distinguishable() {
        let cases = [
            "",
            "deadbeef",
            "$wicket-scrypt-v1$deadbeef$0102$16384$8$",
            "$other-algo$deadbeef$0102$16384$8$1$",
            "$wicket-scrypt-v1$nothex$0102$16384$8$1$",
            "$wicket-scrypt-v1$deadbeef$0102$16383$8$1$",
            "$wicket-scrypt-v1$deadbeef$0102$16384$0$1$",
            "$wicket-scrypt-v1$deadbeef$0102$16384$8$zero$",
        ];
        for text in cases {
            match PasswordRecord::parse(text) {
                Err(SessionError::InvalidPasswordRecord(_)) => {}
                other => panic!("{text:?} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn test_log_n() {
        assert_eq!(sample().log_n(), 14);
    }
}
