//! Password hashing: scrypt KDF with a self-describing record format and
//! transparent cost upgrades on successful verification.

pub mod engine;
pub mod record;

pub use engine::PasswordEngine;
pub use record::{ALGORITHM_TAG, PasswordRecord};
