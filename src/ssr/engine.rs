//! Render engine boundary.
//!
//! The engine that bootstraps an application and turns a document template
//! into markup is external to this crate. The dispatcher only needs it to
//! succeed with a `String` or fail with an error.

use std::future::Future;
use std::pin::Pin;

use super::options::RenderRequest;

/// Type-erased error returned by render engines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Boxed future returned by [`RenderEngine::render`].
pub type RenderFuture<'a> = Pin<Box<dyn Future<Output = Result<String, BoxError>> + Send + 'a>>;

/// An asynchronous markup producer.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one engine serves every request.
/// - `render` is called at most once per dispatched cache miss or uncached
///   request; the dispatcher never retries it.
pub trait RenderEngine: Send + Sync {
    /// Render `request.document` for `request.url` using `request.bootstrap`.
    fn render(&self, request: RenderRequest) -> RenderFuture<'_>;
}

/// [`RenderEngine`] backed by an async closure. Built with [`engine_fn`].
#[derive(Clone)]
pub struct EngineFn<F> {
    f: F,
}

/// Wraps an async closure as a [`RenderEngine`].
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_ssr::ssr::{BoxError, RenderRequest, engine_fn};
///
/// let engine = engine_fn(|request: RenderRequest| async move {
///     let body = format!("<app-root>{}</app-root>", request.url);
///     Ok::<_, BoxError>(request.document.replace("<app-root></app-root>", &body))
/// });
/// ```
pub fn engine_fn<F, Fut>(f: F) -> EngineFn<F>
where
    F: Fn(RenderRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, BoxError>> + Send + 'static,
{
    EngineFn { f }
}

impl<F, Fut> RenderEngine for EngineFn<F>
where
    F: Fn(RenderRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, BoxError>> + Send + 'static,
{
    fn render(&self, request: RenderRequest) -> RenderFuture<'_> {
        Box::pin((self.f)(request))
    }
}
