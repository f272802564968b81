//! # wicket-core
//!
//! Core crate for Wicket. Contains the unified error system, configuration
//! schemas, shared types, and the per-request abstraction the rest of the
//! session subsystem is written against.
//!
//! This crate has **no** internal dependencies on other Wicket crates.

pub mod config;
pub mod error;
pub mod request;
pub mod types;

pub use error::{EarlyExit, SessionError, SessionResult};
pub use request::RequestContext;
pub use types::Mechanism;
