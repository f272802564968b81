//! # wicket-entity
//!
//! Domain value objects for Wicket: session identities, accounts, and the
//! capability keys used by authorization resolution.

pub mod account;
pub mod capability;
pub mod session;

pub use account::Account;
pub use capability::{Capability, CapabilityMap, Provider};
pub use session::Session;
