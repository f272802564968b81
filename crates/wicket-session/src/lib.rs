//! # wicket-session
//!
//! Session negotiation for Wicket: the password engine, the backend-agnostic
//! [`SessionStore`] contract with its in-memory implementation, and the
//! [`SessionProcurer`] that turns an inbound request's cookie or header into
//! a procured [`handle::SessionHandle`].
//!
//! ## Modules
//!
//! - `password` — scrypt hashing with self-describing records and
//!   upgrade-on-check
//! - `store` — the `SessionStore` trait and identifier generation
//! - `memory` — in-memory store implementation
//! - `handle` — the procured-session facade cached on requests
//! - `procurer` — cookie/header session negotiation

pub mod handle;
pub mod memory;
pub mod password;
pub mod procurer;
pub mod store;

pub use handle::SessionHandle;
pub use memory::MemorySessionStore;
pub use password::PasswordEngine;
pub use procurer::SessionProcurer;
pub use store::SessionStore;
