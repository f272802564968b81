//! Configuration schemas for the session subsystem.

use serde::{Deserialize, Serialize};

/// Session procurement configuration.
///
/// The defaults are the wire-compatible names used by every deployment;
/// override per [`crate::request::RequestContext`]-consuming procurer
/// instance when embedding into an existing cookie namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcurerConfig {
    /// Cookie name used on encrypted transports.
    #[serde(default = "default_secure_cookie")]
    pub secure_cookie: String,
    /// Cookie name used on plaintext transports.
    #[serde(default = "default_insecure_cookie")]
    pub insecure_cookie: String,
    /// Header name used on encrypted transports.
    #[serde(default = "default_secure_header")]
    pub secure_header: String,
    /// Header name used on plaintext transports.
    #[serde(default = "default_insecure_header")]
    pub insecure_header: String,
    /// Max-Age for emitted session cookies, in seconds.
    #[serde(default = "default_max_age")]
    pub cookie_max_age_seconds: u64,
    /// Path attribute for emitted session cookies.
    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,
    /// Optional Domain attribute for emitted session cookies.
    #[serde(default)]
    pub cookie_domain: Option<String>,
    /// Whether a GET with no valid session may create one and set a cookie.
    /// When disabled, cookie-mechanism procurement always fails with
    /// `NoSuchSession` instead of allocating.
    #[serde(default = "default_true")]
    pub set_cookie_on_get: bool,
}

impl Default for ProcurerConfig {
    fn default() -> Self {
        Self {
            secure_cookie: default_secure_cookie(),
            insecure_cookie: default_insecure_cookie(),
            secure_header: default_secure_header(),
            insecure_header: default_insecure_header(),
            cookie_max_age_seconds: default_max_age(),
            cookie_path: default_cookie_path(),
            cookie_domain: None,
            set_cookie_on_get: true,
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite::memory:` or a file path URL.
    pub url: String,
    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Timeout for acquiring a connection, in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

/// Password hashing cost configuration.
///
/// `preferred_*` parameterize newly computed hashes; `minimum_n` is the
/// floor below which a stored hash is transparently re-computed on the
/// next successful login.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Preferred CPU/memory cost (N). Must be a power of two.
    #[serde(default = "default_preferred_n")]
    pub preferred_n: u32,
    /// Preferred block size (r).
    #[serde(default = "default_r")]
    pub preferred_r: u32,
    /// Preferred parallelization (p).
    #[serde(default = "default_p")]
    pub preferred_p: u32,
    /// Minimum acceptable stored cost before an upgrade is forced.
    #[serde(default = "default_preferred_n")]
    pub minimum_n: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            preferred_n: default_preferred_n(),
            preferred_r: default_r(),
            preferred_p: default_p(),
            minimum_n: default_preferred_n(),
        }
    }
}

fn default_secure_cookie() -> String {
    "Klein-Secure-Session".to_string()
}

fn default_insecure_cookie() -> String {
    "Klein-INSECURE-Session".to_string()
}

fn default_secure_header() -> String {
    "X-Auth-Token".to_string()
}

fn default_insecure_header() -> String {
    "X-INSECURE-Auth-Token".to_string()
}

fn default_max_age() -> u64 {
    3600
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_preferred_n() -> u32 {
    1 << 14
}

fn default_r() -> u32 {
    8
}

fn default_p() -> u32 {
    1
}
