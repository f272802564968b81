//! Small shared types used across the session subsystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a session token was transmitted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mechanism {
    /// Token arrived in a session cookie (browser-style clients).
    Cookie,
    /// Token arrived in an authorization header (API clients).
    Header,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mechanism::Cookie => write!(f, "cookie"),
            Mechanism::Header => write!(f, "header"),
        }
    }
}

impl FromStr for Mechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cookie" => Ok(Mechanism::Cookie),
            "header" => Ok(Mechanism::Header),
            other => Err(format!("unknown mechanism: {other}")),
        }
    }
}
