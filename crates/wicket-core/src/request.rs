//! The per-request abstraction the session subsystem is written against.
//!
//! A [`RequestContext`] carries everything the procurer and the injection
//! engine need from the surrounding HTTP server: channel security, method,
//! headers, parsed cookies, outgoing cookie collection, a typed per-request
//! component store, and completion notification. A routing adapter
//! constructs one per inbound request and calls [`RequestContext::finish`]
//! when processing completes.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use futures::future::BoxFuture;
use tracing::debug;

use crate::error::{SessionError, SessionResult};

/// A hook run when request processing completes.
///
/// Hooks run exactly once, in registration order. The request transaction
/// layer uses this to commit at end-of-request.
pub type FinishHook = Box<dyn FnOnce() -> BoxFuture<'static, SessionResult<()>> + Send>;

/// An outgoing cookie recorded on the request for the response.
#[derive(Debug, Clone)]
pub struct SetCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Max-Age in seconds.
    pub max_age_seconds: u64,
    /// Path attribute.
    pub path: String,
    /// Optional Domain attribute.
    pub domain: Option<String>,
    /// Whether the Secure attribute is set.
    pub secure: bool,
    /// Whether the HttpOnly attribute is set.
    pub http_only: bool,
}

impl SetCookie {
    /// Render this cookie as a `Set-Cookie` header value.
    pub fn header_value(&self) -> String {
        let mut out = format!(
            "{}={}; Max-Age={}; Path={}",
            self.name, self.value, self.max_age_seconds, self.path
        );
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

/// Mutable per-request state behind the context's lock.
#[derive(Default)]
struct RequestState {
    components: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    set_cookies: Vec<SetCookie>,
    started_writing: bool,
    finish_hooks: Vec<FinishHook>,
    finished: bool,
}

/// One inbound HTTP request, as seen by the session subsystem.
pub struct RequestContext {
    method: Method,
    secure: bool,
    peer: Option<IpAddr>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    state: Mutex<RequestState>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("secure", &self.secure)
            .field("peer", &self.peer)
            .finish()
    }
}

impl RequestContext {
    /// Start building a request context.
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Whether the request arrived over an encrypted transport.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// The peer address, when the transport exposes one.
    pub fn peer(&self) -> Option<IpAddr> {
        self.peer
    }

    /// Look up a request header value as a string, if present and valid
    /// UTF-8.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    /// Look up a request cookie value by name.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    /// Record an outgoing cookie for the response.
    pub fn add_cookie(&self, cookie: SetCookie) {
        let mut state = self.state.lock().expect("request state poisoned");
        state.set_cookies.push(cookie);
    }

    /// The cookies recorded so far, for the response adapter to render.
    pub fn set_cookies(&self) -> Vec<SetCookie> {
        self.state
            .lock()
            .expect("request state poisoned")
            .set_cookies
            .clone()
    }

    /// Mark that the response body has started flushing. After this point
    /// cookie-setting procurement fails with `TooLateForCookies`.
    pub fn begin_response(&self) {
        let mut state = self.state.lock().expect("request state poisoned");
        state.started_writing = true;
    }

    /// Whether the response has started flushing.
    pub fn response_started(&self) -> bool {
        self.state.lock().expect("request state poisoned").started_writing
    }

    /// Attach a typed component to this request, replacing any previous
    /// component of the same type.
    pub fn set_component<T: Any + Send + Sync>(&self, value: T) {
        let mut state = self.state.lock().expect("request state poisoned");
        state.components.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Retrieve a typed component previously attached to this request.
    pub fn component<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let state = self.state.lock().expect("request state poisoned");
        state
            .components
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Remove a typed component from this request.
    pub fn remove_component<T: Any + Send + Sync>(&self) {
        let mut state = self.state.lock().expect("request state poisoned");
        state.components.remove(&TypeId::of::<T>());
    }

    /// Register a hook to run when request processing completes.
    ///
    /// Returns an error if the request has already finished; late hooks
    /// would otherwise silently never run.
    pub fn on_finish(&self, hook: FinishHook) -> SessionResult<()> {
        let mut state = self.state.lock().expect("request state poisoned");
        if state.finished {
            return Err(SessionError::Internal(
                "finish hook registered after request completion".to_string(),
            ));
        }
        state.finish_hooks.push(hook);
        Ok(())
    }

    /// Run all finish hooks, in registration order, exactly once.
    ///
    /// Subsequent calls are no-ops. If the caller never invokes this (the
    /// client disconnected mid-request), registered work such as a pending
    /// transaction commit simply does not happen; see the transaction
    /// layer's documentation for the rollback story.
    pub async fn finish(&self) -> SessionResult<()> {
        let hooks = {
            let mut state = self.state.lock().expect("request state poisoned");
            if state.finished {
                return Ok(());
            }
            state.finished = true;
            std::mem::take(&mut state.finish_hooks)
        };
        debug!(hooks = hooks.len(), "running request finish hooks");
        for hook in hooks {
            hook().await?;
        }
        Ok(())
    }
}

/// Builder for [`RequestContext`].
#[derive(Default)]
pub struct RequestContextBuilder {
    method: Option<Method>,
    secure: bool,
    peer: Option<IpAddr>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
}

impl RequestContextBuilder {
    /// Set the HTTP method. Defaults to `GET`.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Mark the request as arriving over an encrypted transport.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the peer address.
    pub fn peer(mut self, peer: IpAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Add a request header. Invalid names or values are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Add a single parsed cookie.
    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    /// Parse and absorb a raw `Cookie` header value (`a=1; b=2`).
    pub fn raw_cookie_header(mut self, raw: &str) -> Self {
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }
        self
    }

    /// Finish building.
    pub fn build(self) -> Arc<RequestContext> {
        Arc::new(RequestContext {
            method: self.method.unwrap_or(Method::GET),
            secure: self.secure,
            peer: self.peer,
            headers: self.headers,
            cookies: self.cookies,
            state: Mutex::new(RequestState::default()),
        })
    }
}
