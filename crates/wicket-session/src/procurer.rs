//! Session procurement: negotiating a session from an inbound request.

use std::sync::Arc;

use axum::http::Method;
use tracing::{debug, info, warn};

use wicket_core::config::ProcurerConfig;
use wicket_core::request::{RequestContext, SetCookie};
use wicket_core::{Mechanism, SessionError, SessionResult};

use crate::handle::SessionHandle;
use crate::store::SessionStore;

/// Negotiates a session from an incoming request's cookie or header,
/// creating one when policy allows.
///
/// Shared, immutable-after-construction: one procurer serves many
/// concurrent requests; all per-request state lives on the
/// [`RequestContext`] itself.
pub struct SessionProcurer {
    store: Arc<dyn SessionStore>,
    config: ProcurerConfig,
}

impl std::fmt::Debug for SessionProcurer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProcurer")
            .field("config", &self.config)
            .finish()
    }
}

impl SessionProcurer {
    /// Create a procurer over the given store.
    pub fn new(store: Arc<dyn SessionStore>, config: ProcurerConfig) -> Self {
        Self { store, config }
    }

    /// Procure a session for this request.
    ///
    /// Idempotent per request and per security mode: a session already
    /// attached to the request is returned as-is, unless `force_insecure`
    /// asks for the insecure-channel view of a secure request, in which
    /// case a fresh (uncached) procurement runs.
    ///
    /// Failure modes are ordinary control flow for callers:
    /// [`SessionError::NoSuchSession`] when a token is absent/invalid and
    /// policy forbids creating one, [`SessionError::TooLateForCookies`]
    /// when a cookie would be needed but the response already started.
    pub async fn procure_session(
        &self,
        request: &Arc<RequestContext>,
        force_insecure: bool,
    ) -> SessionResult<SessionHandle> {
        let layered_insecure = force_insecure && request.is_secure();

        // Step 1: at-most-once procurement per request per security mode.
        if !layered_insecure {
            if let Some(cached) = request.component::<SessionHandle>() {
                debug!("returning session already attached to request");
                return Ok((*cached).clone());
            }
        }

        // Step 2: channel security class selects the token namespace.
        let channel_secure = request.is_secure() && !force_insecure;
        let (cookie_name, header_name) = if channel_secure {
            (&self.config.secure_cookie, &self.config.secure_header)
        } else {
            (&self.config.insecure_cookie, &self.config.insecure_header)
        };

        // Step 3: a plaintext transport that carries secure-channel tokens
        // has disclosed them; purge those sessions before doing anything
        // else with this request.
        if !request.is_secure() {
            let mut leaked = Vec::new();
            if let Some(token) = request.header(&self.config.secure_header) {
                leaked.push(token);
            }
            if let Some(token) = request.cookie(&self.config.secure_cookie) {
                leaked.push(token);
            }
            if !leaked.is_empty() {
                warn!(
                    tokens = leaked.len(),
                    "secure-channel session tokens observed on an insecure transport"
                );
                self.store.sent_insecurely(leaked).await;
            }
        }

        // Step 4: header takes precedence over cookie.
        let (sent_token, mechanism) = match request.header(header_name) {
            Some(token) => (Some(token), Mechanism::Header),
            None => (request.cookie(cookie_name), Mechanism::Cookie),
        };

        // Step 5: try to load whatever was presented. An unresolvable
        // header token is fatal (API clients must present a valid token);
        // an unresolvable cookie just means "no session yet".
        let mut session = None;
        if let Some(token) = &sent_token {
            match self
                .store
                .load_session(token, channel_secure, mechanism)
                .await
            {
                Ok(loaded) => session = Some(loaded),
                Err(SessionError::NoSuchSession { .. }) if mechanism == Mechanism::Cookie => {
                    debug!("cookie token did not resolve; may create a fresh session");
                }
                Err(err) => return Err(err),
            }
        }

        // Step 6: cookie mechanism may create a session, under policy.
        let needs_cookie = mechanism == Mechanism::Cookie
            && (session.is_none()
                || session.as_ref().map(|s| s.identifier.as_str()) != sent_token.as_deref());
        if needs_cookie {
            if request.response_started() {
                return Err(SessionError::TooLateForCookies);
            }
            if request.method() != Method::GET {
                // Destructive methods must never silently acquire a
                // session.
                warn!(method = %request.method(), "refusing to create a session for a non-GET request");
                return Err(SessionError::no_such_session(Mechanism::Cookie));
            }
            if !self.config.set_cookie_on_get {
                return Err(SessionError::no_such_session(Mechanism::Cookie));
            }

            let created = self
                .store
                .new_session(channel_secure, Mechanism::Cookie)
                .await?;
            request.add_cookie(SetCookie {
                name: cookie_name.clone(),
                value: created.identifier.clone(),
                max_age_seconds: self.config.cookie_max_age_seconds,
                path: self.config.cookie_path.clone(),
                domain: self.config.cookie_domain.clone(),
                secure: channel_secure,
                http_only: true,
            });
            info!(confidential = channel_secure, "issued new session cookie");
            session = Some(created);
        }

        let session = session.ok_or_else(|| SessionError::no_such_session(mechanism))?;
        let handle = SessionHandle::new(session, self.store.clone());

        // Step 7: cache on the request, except for a forced-insecure fetch
        // layered on a secure request — that must not contaminate the
        // secure cache slot.
        if !layered_insecure {
            request.set_component(handle.clone());
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    use crate::memory::MemorySessionStore;

    fn procurer(store: Arc<MemorySessionStore>) -> SessionProcurer {
        SessionProcurer::new(store, ProcurerConfig::default())
    }

    #[tokio::test]
    async fn test_get_with_no_token_creates_and_sets_cookie() {
        let store = MemorySessionStore::new();
        let procurer = procurer(store);
        let request = RequestContext::builder().secure(true).build();

        let handle = procurer.procure_session(&request, false).await.unwrap();
        assert!(handle.session().confidential);
        assert_eq!(handle.session().mechanism, Mechanism::Cookie);

        let cookies = request.set_cookies();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "Klein-Secure-Session");
        assert_eq!(cookies[0].value, handle.session().identifier);
        assert!(cookies[0].secure);
        assert!(cookies[0].http_only);
    }

    #[tokio::test]
    async fn test_procurement_is_idempotent_within_request() {
        let store = MemorySessionStore::new();
        let procurer = procurer(store);
        let request = RequestContext::builder().secure(true).build();

        let first = procurer.procure_session(&request, false).await.unwrap();
        let second = procurer.procure_session(&request, false).await.unwrap();
        assert_eq!(first.session(), second.session());
        // Only the first procurement issued a cookie.
        assert_eq!(request.set_cookies().len(), 1);
    }

    #[tokio::test]
    async fn test_post_without_session_fails_instead_of_creating() {
        let store = MemorySessionStore::new();
        let procurer = procurer(store.clone());
        let request = RequestContext::builder()
            .method(Method::POST)
            .secure(false)
            .build();

        let err = procurer.procure_session(&request, false).await.unwrap_err();
        assert!(matches!(err, SessionError::NoSuchSession { .. }));
        assert!(request.set_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_started_response_is_too_late_for_cookies() {
        let store = MemorySessionStore::new();
        let procurer = procurer(store);
        let request = RequestContext::builder().secure(true).build();
        request.begin_response();

        let err = procurer.procure_session(&request, false).await.unwrap_err();
        assert!(matches!(err, SessionError::TooLateForCookies));
    }

    #[tokio::test]
    async fn test_cookie_policy_disabled_never_creates() {
        let store = MemorySessionStore::new();
        let config = ProcurerConfig {
            set_cookie_on_get: false,
            ..ProcurerConfig::default()
        };
        let procurer = SessionProcurer::new(store, config);
        let request = RequestContext::builder().secure(true).build();

        let err = procurer.procure_session(&request, false).await.unwrap_err();
        assert!(matches!(err, SessionError::NoSuchSession { .. }));
    }

    #[tokio::test]
    async fn test_header_token_resolves_with_header_mechanism() {
        let store = MemorySessionStore::new();
        let existing = store.new_session(true, Mechanism::Header).await.unwrap();
        let procurer = procurer(store);

        let request = RequestContext::builder()
            .secure(true)
            .header("X-Auth-Token", &existing.identifier)
            .build();

        let handle = procurer.procure_session(&request, false).await.unwrap();
        assert_eq!(handle.session().identifier, existing.identifier);
        assert_eq!(handle.session().mechanism, Mechanism::Header);
        // Header procurement never needs a cookie.
        assert!(request.set_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_bad_header_token_is_fatal() {
        let store = MemorySessionStore::new();
        let procurer = procurer(store);
        let request = RequestContext::builder()
            .secure(true)
            .header("X-Auth-Token", "not-a-real-token")
            .build();

        let err = procurer.procure_session(&request, false).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NoSuchSession {
                mechanism: Mechanism::Header
            }
        ));
    }

    #[tokio::test]
    async fn test_bad_cookie_token_is_replaced() {
        let store = MemorySessionStore::new();
        let procurer = procurer(store);
        let request = RequestContext::builder()
            .secure(true)
            .cookie("Klein-Secure-Session", "stale-token")
            .build();

        let handle = procurer.procure_session(&request, false).await.unwrap();
        assert_ne!(handle.session().identifier, "stale-token");
        let cookies = request.set_cookies();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, handle.session().identifier);
    }

    #[tokio::test]
    async fn test_secure_token_on_insecure_transport_is_purged() {
        let store = MemorySessionStore::new();
        let secure_session = store.new_session(true, Mechanism::Cookie).await.unwrap();
        let procurer = procurer(store.clone());

        // The insecure request leaks the secure cookie; procurement fails
        // for the POST, but the disclosed session must already be gone.
        let request = RequestContext::builder()
            .method(Method::POST)
            .secure(false)
            .cookie("Klein-Secure-Session", &secure_session.identifier)
            .build();
        let _ = procurer.procure_session(&request, false).await;

        let err = store
            .load_session(&secure_session.identifier, true, Mechanism::Cookie)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NoSuchSession { .. }));
    }

    #[tokio::test]
    async fn test_forced_insecure_on_secure_request_is_not_cached() {
        let store = MemorySessionStore::new();
        let procurer = procurer(store);
        let request = RequestContext::builder().secure(true).build();

        // Secure procurement caches its handle.
        let secure_handle = procurer.procure_session(&request, false).await.unwrap();

        // Forced-insecure procurement returns a different session and
        // leaves the secure one in the cache slot.
        let insecure_handle = procurer.procure_session(&request, true).await.unwrap();
        assert_ne!(
            insecure_handle.session().identifier,
            secure_handle.session().identifier
        );
        assert!(!insecure_handle.session().confidential);

        let cached = request.component::<SessionHandle>().unwrap();
        assert_eq!(cached.session(), secure_handle.session());
    }
}
