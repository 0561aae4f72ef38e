//! View adapter — plugs an [`SsrDispatcher`] into the server's handler shape.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use super::dispatcher::SsrDispatcher;
use super::options::{RenderOptions, ResponseHandle};
use crate::http::{Method, StatusCode};
use crate::{Request, Response};

/// Renders every `GET` request through a shared dispatcher.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_ssr::server::Server;
/// use rttp_ssr::ssr::{BoxError, RenderRequest, SetupOptions, SsrDispatcher, SsrView, engine_fn};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = engine_fn(|request: RenderRequest| async move {
///     Ok::<_, BoxError>(request.document.to_string())
/// });
/// let dispatcher = SsrDispatcher::new(SetupOptions::new("AppServerModule"), Arc::new(engine));
/// let view = SsrView::new(Arc::new(dispatcher), "dist/browser/index.html");
///
/// let server = Server::bind("127.0.0.1:4000").await?;
/// server.run(move |req| {
///     let view = view.clone();
///     async move { view.handle(req).await }
/// }).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SsrView {
    dispatcher: Arc<SsrDispatcher>,
    document: Arc<Path>,
}

impl SsrView {
    /// Creates a view rendering the document template at `document`.
    pub fn new(dispatcher: Arc<SsrDispatcher>, document: impl Into<PathBuf>) -> Self {
        Self {
            dispatcher,
            document: Arc::from(document.into()),
        }
    }

    /// Renders `req` into an HTML response.
    ///
    /// Status and headers set by the application through the `RESPONSE`
    /// provider are carried over. Any render failure becomes a
    /// `500 Internal Server Error`.
    pub async fn handle(&self, req: Request) -> Response {
        if *req.method() != Method::Get {
            return Response::new(StatusCode::MethodNotAllowed)
                .header("Allow", "GET")
                .body("Method Not Allowed");
        }

        let path = req.path().to_owned();
        let res = ResponseHandle::new();
        let options = RenderOptions::new(req).response(res.clone());

        match self.dispatcher.render(&*self.document, options).await {
            Ok(html) => {
                debug!(path = %path, bytes = html.len(), "rendered page");
                res.into_response(html)
            }
            Err(err) => {
                error!(path = %path, error = %err, "server-side render failed");
                Response::new(StatusCode::InternalServerError).body("Internal Server Error")
            }
        }
    }
}
