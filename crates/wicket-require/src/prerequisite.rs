//! The bundled session-procurement prerequisite.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use wicket_core::{EarlyExit, SessionError};
use wicket_session::SessionProcurer;

use crate::injector::InjectorFault;
use crate::lifecycle::PrepareHook;

/// A prepare hook that procures a session and caches it as a request
/// component, so every `Authorization` parameter on the route can assume
/// one is present.
///
/// Policy outcomes become early exits with appropriate statuses:
/// `NoSuchSession` is the client's fault (401), `TooLateForCookies` is a
/// server-side ordering bug (500). Other failures propagate.
pub fn session_prerequisite(procurer: Arc<SessionProcurer>) -> PrepareHook {
    Arc::new(move |request| {
        let procurer = procurer.clone();
        Box::pin(async move {
            match procurer.procure_session(&request, false).await {
                Ok(_handle) => Ok(()),
                Err(SessionError::NoSuchSession { mechanism }) => {
                    warn!(%mechanism, "request has no procurable session");
                    Err(InjectorFault::Exit(EarlyExit::new(
                        (StatusCode::UNAUTHORIZED, "no valid session").into_response(),
                    )))
                }
                Err(SessionError::TooLateForCookies) => Err(InjectorFault::Exit(EarlyExit::new(
                    StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                ))),
                Err(err) => Err(InjectorFault::Failed(err)),
            }
        })
    })
}
