//! Required-parameter descriptors, their per-request injectors, and the
//! argument bundle handed to handlers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use wicket_core::request::RequestContext;
use wicket_core::{EarlyExit, SessionError};
use wicket_entity::Provider;

use crate::lifecycle::RequestLifecycle;

/// URL-extracted route parameters, as the routing layer hands them over.
pub type RouteParams = HashMap<String, String>;

/// Why a preparation step or injector stopped the normal flow.
#[derive(Debug)]
pub enum InjectorFault {
    /// Designed short-circuit: stop resolution, skip the handler, respond
    /// with the carried payload.
    Exit(EarlyExit),
    /// A real failure that should surface to the route-level error layer.
    Failed(SessionError),
}

impl From<EarlyExit> for InjectorFault {
    fn from(exit: EarlyExit) -> Self {
        Self::Exit(exit)
    }
}

impl From<SessionError> for InjectorFault {
    fn from(err: SessionError) -> Self {
        Self::Failed(err)
    }
}

/// A declarative route-parameter descriptor.
///
/// At route-compilation time each descriptor registers itself: it may
/// append prepare hooks to the shared lifecycle (a session prerequisite
/// does; an authorization parameter does not) and returns the injector
/// that will resolve its value per request.
pub trait RequiredParameter: Send {
    /// Register against the route's lifecycle and produce the injector.
    fn register_injector(
        self: Box<Self>,
        name: &str,
        lifecycle: &mut RequestLifecycle,
    ) -> Box<dyn Injector>;
}

/// Per-request value resolution for one declared parameter.
#[async_trait]
pub trait Injector: Send + Sync {
    /// Called once all sibling injectors are registered, before the route
    /// is used. Lets an injector lock in behavior that depends on what
    /// else was declared.
    fn finalize(&mut self) {}

    /// Resolve this parameter's value for one request.
    ///
    /// `Ok(None)` injects nothing (the argument is simply absent);
    /// `Err(InjectorFault::Exit(_))` aborts the handler with the carried
    /// response.
    async fn inject_value(
        &self,
        request: &Arc<RequestContext>,
        route_params: &RouteParams,
    ) -> Result<Option<Provider>, InjectorFault>;
}

/// One resolved argument.
#[derive(Clone)]
enum ArgumentValue {
    Route(String),
    Injected(Provider),
}

/// The merged arguments a handler receives: URL route parameters plus
/// injected values. On a name collision the injected value wins, since
/// injection is applied second.
#[derive(Clone, Default)]
pub struct Arguments {
    values: HashMap<String, ArgumentValue>,
}

impl Arguments {
    /// Build from route parameters alone.
    pub fn from_route(route_params: &RouteParams) -> Self {
        let values = route_params
            .iter()
            .map(|(k, v)| (k.clone(), ArgumentValue::Route(v.clone())))
            .collect();
        Self { values }
    }

    /// Overlay an injected value, displacing any route parameter of the
    /// same name.
    pub fn put_injected(&mut self, name: &str, provider: Provider) {
        self.values
            .insert(name.to_string(), ArgumentValue::Injected(provider));
    }

    /// A route (string) argument, if present and not displaced.
    pub fn route(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgumentValue::Route(value)) => Some(value),
            _ => None,
        }
    }

    /// An injected argument, downcast to its concrete type.
    pub fn injected<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        match self.values.get(name) {
            Some(ArgumentValue::Injected(provider)) => provider.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Whether an argument of this name exists at all.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the bundle is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments").field("len", &self.values.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_wins_over_route() {
        let mut route = RouteParams::new();
        route.insert("name".to_string(), "from-url".to_string());
        route.insert("other".to_string(), "kept".to_string());

        let mut args = Arguments::from_route(&route);
        args.put_injected("name", Arc::new(42u32));

        assert!(args.route("name").is_none());
        assert_eq!(*args.injected::<u32>("name").unwrap(), 42);
        assert_eq!(args.route("other"), Some("kept"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_injected_downcast_is_type_checked() {
        let mut args = Arguments::default();
        args.put_injected("n", Arc::new(42u32));
        assert!(args.injected::<String>("n").is_none());
        assert!(args.injected::<u32>("n").is_some());
    }
}
