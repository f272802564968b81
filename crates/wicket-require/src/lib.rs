//! # wicket-require
//!
//! Declarative per-route dependency injection and authorization.
//!
//! A [`Requirer`] compiles a list of named [`RequiredParameter`]s and a
//! user function into a [`CompiledRoute`]. Per request, the route runs its
//! prepare hooks, resolves each parameter's injector, and invokes the user
//! function with the merged [`Arguments`] bundle. Any step may short-circuit
//! with an [`EarlyExit`](wicket_core::EarlyExit) whose payload becomes the
//! response.
//!
//! ## Modules
//!
//! - `injector` — parameter descriptors, injectors, faults, arguments
//! - `lifecycle` — the ordered prepare-hook list
//! - `requirer` — route compilation and per-request execution
//! - `authorization` — the capability-gated parameter kind
//! - `prerequisite` — the bundled session-procurement hook

pub mod authorization;
pub mod injector;
pub mod lifecycle;
pub mod prerequisite;
pub mod requirer;

pub use authorization::Authorization;
pub use injector::{Arguments, Injector, InjectorFault, RequiredParameter, RouteParams};
pub use lifecycle::{PrepareHook, RequestLifecycle};
pub use prerequisite::session_prerequisite;
pub use requirer::{CompiledRoute, Handler, Requirer};
