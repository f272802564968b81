//! The `Authorization` required-parameter kind.
//!
//! Declaring `Authorization::new::<FooCritic>()` on a route means the
//! handler receives either a working `FooCritic` provider or the request
//! is answered with the denial response, with no manual checks in the
//! handler body.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use wicket_core::EarlyExit;
use wicket_core::request::RequestContext;
use wicket_entity::{Capability, Provider};
use wicket_session::SessionHandle;

use crate::injector::{Injector, InjectorFault, RequiredParameter, RouteParams};
use crate::lifecycle::RequestLifecycle;

/// Builds the denial response for a missing capability.
pub type DenialFn = Arc<dyn Fn(Capability) -> Response + Send + Sync>;

/// A required parameter that asks the procured session to authorize a
/// capability and injects the produced provider.
pub struct Authorization {
    capability: Capability,
    required: bool,
    when_denied: DenialFn,
}

impl Authorization {
    /// Require capability `T`; denial aborts the handler with the default
    /// 401 response naming the missing capability.
    pub fn new<T: Any + Send + Sync>() -> Self {
        Self {
            capability: Capability::of::<T>(),
            required: true,
            when_denied: Arc::new(default_denial),
        }
    }

    /// Ask for capability `T` but inject nothing when it is not granted,
    /// instead of aborting.
    pub fn optional<T: Any + Send + Sync>() -> Self {
        Self {
            required: false,
            ..Self::new::<T>()
        }
    }

    /// Replace the denial response builder.
    pub fn when_denied(mut self, denial: DenialFn) -> Self {
        self.when_denied = denial;
        self
    }

    /// Erase into a required-parameter box, for `Requirer::require`.
    pub fn boxed(self) -> Box<dyn RequiredParameter> {
        Box::new(self)
    }
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorization")
            .field("capability", &self.capability)
            .field("required", &self.required)
            .finish()
    }
}

fn default_denial(capability: Capability) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        format!("not authorized for {capability}"),
    )
        .into_response()
}

impl RequiredParameter for Authorization {
    fn register_injector(
        self: Box<Self>,
        _name: &str,
        _lifecycle: &mut RequestLifecycle,
    ) -> Box<dyn Injector> {
        // Adds no hooks of its own; the session prerequisite is expected
        // to be registered on the requirer and ordered before injection.
        Box::new(AuthorizationInjector {
            capability: self.capability,
            required: self.required,
            when_denied: self.when_denied,
        })
    }
}

struct AuthorizationInjector {
    capability: Capability,
    required: bool,
    when_denied: DenialFn,
}

#[async_trait]
impl Injector for AuthorizationInjector {
    async fn inject_value(
        &self,
        request: &Arc<RequestContext>,
        _route_params: &RouteParams,
    ) -> Result<Option<Provider>, InjectorFault> {
        let Some(handle) = request.component::<SessionHandle>() else {
            warn!(capability = %self.capability, "no session procured before authorization");
            if self.required {
                return Err(EarlyExit::new((self.when_denied)(self.capability)).into());
            }
            return Ok(None);
        };

        let map = handle.authorize(&[self.capability]).await?;
        match map.get_erased(self.capability) {
            Some(provider) => Ok(Some(provider)),
            None if self.required => {
                debug!(capability = %self.capability, "session denied required capability");
                Err(EarlyExit::new((self.when_denied)(self.capability)).into())
            }
            None => Ok(None),
        }
    }
}
