//! The route compiler and per-request executor.

use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tracing::{debug, error, warn};

use wicket_core::request::RequestContext;

use crate::injector::{Arguments, Injector, InjectorFault, RequiredParameter, RouteParams};
use crate::lifecycle::{PrepareHook, RequestLifecycle};

/// The user function wrapped by a compiled route.
pub type Handler =
    Arc<dyn Fn(Arc<RequestContext>, Arguments) -> BoxFuture<'static, Response> + Send + Sync>;

/// Compiles routes: accumulates globally-registered prerequisites, then
/// [`Requirer::require`] wires declared parameters and the user function
/// into a [`CompiledRoute`].
///
/// Registration and finalization happen synchronously inside `require`;
/// there is no deferred metaprogramming phase.
#[derive(Default)]
pub struct Requirer {
    prerequisites: Vec<PrepareHook>,
    provided: Vec<&'static str>,
    unsatisfied: Vec<(&'static str, &'static str)>,
}

impl Requirer {
    /// A requirer with no prerequisites.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prerequisite that every route compiled by this requirer
    /// will run, in registration order, before any injector resolution.
    pub fn prerequisite(&mut self, hook: PrepareHook) -> &mut Self {
        self.prerequisites.push(hook);
        self
    }

    /// Register a labeled prerequisite.
    ///
    /// `provides` names what the hook attaches to the request; `requires`
    /// names labels the hook depends on. The labels are advisory: hooks
    /// always run in registration order with no reordering, and a
    /// requirement not already provided by an earlier registration is
    /// logged and recorded (see [`Requirer::unsatisfied_requirements`])
    /// rather than resolved.
    pub fn prerequisite_providing(
        &mut self,
        provides: &'static str,
        requires: &[&'static str],
        hook: PrepareHook,
    ) -> &mut Self {
        for &requirement in requires {
            if !self.provided.contains(&requirement) {
                warn!(provides, requirement, "prerequisite registered before its requirement");
                self.unsatisfied.push((provides, requirement));
            }
        }
        self.provided.push(provides);
        self.prerequisite(hook)
    }

    /// Requirements named by [`Requirer::prerequisite_providing`] that no
    /// earlier registration provided, as `(provides, missing)` pairs.
    pub fn unsatisfied_requirements(&self) -> &[(&'static str, &'static str)] {
        &self.unsatisfied
    }

    /// Convenience wrapper over [`Requirer::prerequisite`] for plain async
    /// closures.
    pub fn prerequisite_fn<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), InjectorFault>> + Send + 'static,
    {
        self.prerequisite(Arc::new(move |request| Box::pin(hook(request))))
    }

    /// Compile a route from its declared parameters and user function.
    ///
    /// Two-phase setup: every parameter registers first (and may append
    /// hooks to the shared lifecycle), the requirer's prerequisites are
    /// appended, then every injector is finalized with full knowledge of
    /// its siblings.
    pub fn require<F, Fut>(
        &self,
        parameters: Vec<(&'static str, Box<dyn RequiredParameter>)>,
        handler: F,
    ) -> CompiledRoute
    where
        F: Fn(Arc<RequestContext>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let mut lifecycle = RequestLifecycle::new();

        let mut injectors: Vec<(String, Box<dyn Injector>)> = parameters
            .into_iter()
            .map(|(name, parameter)| {
                let injector = parameter.register_injector(name, &mut lifecycle);
                (name.to_string(), injector)
            })
            .collect();

        for prerequisite in &self.prerequisites {
            lifecycle.add_prepare_hook(prerequisite.clone());
        }

        for (_, injector) in injectors.iter_mut() {
            injector.finalize();
        }

        debug!(
            injectors = injectors.len(),
            hooks = lifecycle.len(),
            "compiled route"
        );

        CompiledRoute {
            lifecycle,
            injectors,
            handler: Arc::new(move |request, arguments| Box::pin(handler(request, arguments))),
        }
    }
}

/// One compiled route: the shared lifecycle, the per-parameter injectors,
/// and the wrapped user function.
pub struct CompiledRoute {
    lifecycle: RequestLifecycle,
    injectors: Vec<(String, Box<dyn Injector>)>,
    handler: Handler,
}

impl CompiledRoute {
    /// Process one request.
    ///
    /// Prepare hooks run fully before any injector resolves; the first
    /// early exit stops resolution and its payload becomes the response;
    /// otherwise the handler runs with the merged arguments. In every
    /// case the request's finish hooks (transaction commits) run before
    /// the response is returned.
    pub async fn handle(
        &self,
        request: Arc<RequestContext>,
        route_params: RouteParams,
    ) -> Response {
        let outcome = self.resolve_and_call(&request, &route_params).await;

        let mut response = match outcome {
            Ok(response) => response,
            Err(InjectorFault::Exit(exit)) => {
                debug!("route interrupted by early exit");
                exit.response
            }
            Err(InjectorFault::Failed(err)) => {
                error!(error = %err, "route preparation failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        };

        if let Err(err) = request.finish().await {
            error!(error = %err, "request completion failed");
            response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        response
    }

    async fn resolve_and_call(
        &self,
        request: &Arc<RequestContext>,
        route_params: &RouteParams,
    ) -> Result<Response, InjectorFault> {
        self.lifecycle.run(request).await?;

        let mut arguments = Arguments::from_route(route_params);
        for (name, injector) in &self.injectors {
            if let Some(provider) = injector.inject_value(request, route_params).await? {
                arguments.put_injected(name, provider);
            }
        }

        Ok((self.handler)(request.clone(), arguments).await)
    }
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("injectors", &self.injectors.len())
            .finish()
    }
}
