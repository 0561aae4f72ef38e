//! Setup-time and per-call render options, and the request handed to the engine.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::policy::RoutePolicy;
use crate::http::{Headers, Response, StatusCode};
use crate::Request;

/// Injection token under which the incoming request is bound.
pub const REQUEST_TOKEN: &str = "REQUEST";

/// Injection token under which the response handle is bound.
pub const RESPONSE_TOKEN: &str = "RESPONSE";

/// The application entry unit the engine instantiates to produce markup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bootstrap(Arc<str>);

impl Bootstrap {
    /// Creates a bootstrap target from its name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The target's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Bootstrap {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Bootstrap {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A value made available to the rendered application.
#[derive(Debug, Clone)]
pub enum Provider {
    /// A static value bound to an application-defined token.
    Value { token: String, value: Value },
    /// The incoming request, bound to [`REQUEST_TOKEN`].
    Request(Arc<Request>),
    /// The response handle, bound to [`RESPONSE_TOKEN`].
    Response(ResponseHandle),
}

impl Provider {
    /// Binds `value` to `token`.
    pub fn value(token: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Value {
            token: token.into(),
            value: value.into(),
        }
    }

    /// The injection token this provider is bound to.
    pub fn token(&self) -> &str {
        match self {
            Self::Value { token, .. } => token,
            Self::Request(_) => REQUEST_TOKEN,
            Self::Response(_) => RESPONSE_TOKEN,
        }
    }
}

#[derive(Debug, Default)]
struct ResponseParts {
    status: StatusCode,
    headers: Headers,
}

/// Shared handle through which a rendered application shapes its HTTP response.
///
/// Clones point at the same state. The view adapter creates one per request,
/// binds it as the `RESPONSE` provider, and builds the final [`Response`] from
/// whatever the application set during rendering.
///
/// # Examples
///
/// ```
/// use rttp_ssr::http::StatusCode;
/// use rttp_ssr::ssr::ResponseHandle;
///
/// let handle = ResponseHandle::new();
/// handle.clone().set_status(StatusCode::NotFound);
///
/// let response = handle.into_response("<h1>missing</h1>");
/// assert_eq!(response.status(), StatusCode::NotFound);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    inner: Arc<Mutex<ResponseParts>>,
}

impl ResponseHandle {
    /// Creates a handle with status `200 OK` and no headers.
    pub fn new() -> Self {
        Self::default()
    }

    fn parts(&self) -> MutexGuard<'_, ResponseParts> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the status code of the eventual response.
    pub fn set_status(&self, status: StatusCode) {
        self.parts().status = status;
    }

    /// Returns the status code set so far.
    pub fn status(&self) -> StatusCode {
        self.parts().status
    }

    /// Appends a response header.
    pub fn insert_header(&self, name: impl Into<String>, value: impl Into<String>) {
        self.parts().headers.insert(name, value);
    }

    /// Returns a snapshot of the headers set so far.
    pub fn headers(&self) -> Headers {
        self.parts().headers.clone()
    }

    /// Builds an HTML response carrying the accumulated status and headers.
    pub fn into_response(self, markup: impl Into<String>) -> Response {
        let parts = self.parts();
        let mut response = Response::new(parts.status);
        for (name, value) in parts.headers.iter() {
            response.add_header(name, value);
        }
        drop(parts);
        response.html(markup)
    }
}

/// Options supplied once, when the dispatcher is built.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Fallback bootstrap target when a call supplies none.
    pub bootstrap: Option<Bootstrap>,
    /// Providers prepended to every render.
    pub providers: Vec<Provider>,
    /// Cache policies in priority order.
    pub route_caches: Vec<RoutePolicy>,
}

impl SetupOptions {
    /// Creates setup options with a bootstrap target and no providers or policies.
    pub fn new(bootstrap: impl Into<Bootstrap>) -> Self {
        Self {
            bootstrap: Some(bootstrap.into()),
            ..Self::default()
        }
    }

    /// Adds a provider shared by every render.
    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Appends a route cache policy.
    #[must_use]
    pub fn route_cache(mut self, policy: RoutePolicy) -> Self {
        self.route_caches.push(policy);
        self
    }
}

/// Options supplied by the view hook for one render.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// The request being rendered.
    pub req: Arc<Request>,
    /// Response handle to bind as `RESPONSE`, if any.
    pub res: Option<ResponseHandle>,
    /// Absolute URL override; derived from the request when absent.
    pub url: Option<String>,
    /// Document template override; read from the template store when absent.
    pub document: Option<Arc<str>>,
    /// Bootstrap override for this call.
    pub bootstrap: Option<Bootstrap>,
    /// Extra providers for this call.
    pub providers: Vec<Provider>,
}

impl RenderOptions {
    /// Creates options for `req` with every override unset.
    pub fn new(req: impl Into<Arc<Request>>) -> Self {
        Self {
            req: req.into(),
            res: None,
            url: None,
            document: None,
            bootstrap: None,
            providers: Vec::new(),
        }
    }

    /// Binds a response handle for the application.
    #[must_use]
    pub fn response(mut self, res: ResponseHandle) -> Self {
        self.res = Some(res);
        self
    }

    /// Uses `url` instead of deriving it from the request.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses `document` instead of reading the template file.
    #[must_use]
    pub fn document(mut self, document: impl Into<Arc<str>>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Overrides the setup-time bootstrap target.
    #[must_use]
    pub fn bootstrap(mut self, bootstrap: impl Into<Bootstrap>) -> Self {
        self.bootstrap = Some(bootstrap.into());
        self
    }

    /// Adds a provider for this call only.
    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }
}

/// Everything the engine needs for one render. Built fresh per call.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub bootstrap: Bootstrap,
    pub providers: Vec<Provider>,
    pub url: String,
    pub document: Arc<str>,
}

impl RenderRequest {
    /// Finds the first provider bound to `token`.
    pub fn provider(&self, token: &str) -> Option<&Provider> {
        self.providers.iter().find(|provider| provider.token() == token)
    }

    /// The response handle bound for this render, if any.
    pub fn response(&self) -> Option<&ResponseHandle> {
        self.providers.iter().find_map(|provider| match provider {
            Provider::Response(handle) => Some(handle),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tokens() {
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        assert_eq!(Provider::value("API_URL", "https://api").token(), "API_URL");
        assert_eq!(Provider::Request(Arc::new(req)).token(), REQUEST_TOKEN);
        assert_eq!(Provider::Response(ResponseHandle::new()).token(), RESPONSE_TOKEN);
    }

    #[test]
    fn response_handle_clones_share_state() {
        let handle = ResponseHandle::new();
        let bound = handle.clone();
        bound.set_status(StatusCode::NotFound);
        bound.insert_header("Cache-Control", "no-store");

        assert_eq!(handle.status(), StatusCode::NotFound);
        assert_eq!(handle.headers().get("cache-control"), Some("no-store"));
    }

    #[test]
    fn into_response_is_html_with_headers() {
        let handle = ResponseHandle::new();
        handle.insert_header("X-Rendered-By", "ssr");
        let response = handle.into_response("<p>ok</p>");

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.headers().get("x-rendered-by"), Some("ssr"));
        assert_eq!(
            response.headers().get("content-type"),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(response.body_ref(), b"<p>ok</p>");
    }

    #[test]
    fn setup_builder() {
        let setup = SetupOptions::new("AppServerModule")
            .provider(Provider::value("LOCALE", "en"))
            .route_cache(RoutePolicy::new("/"));
        assert_eq!(setup.bootstrap.as_ref().map(Bootstrap::name), Some("AppServerModule"));
        assert_eq!(setup.providers.len(), 1);
        assert_eq!(setup.route_caches.len(), 1);
    }
}
