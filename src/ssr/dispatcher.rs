//! Render dispatcher — serves a page from the render cache or renders it.
//!
//! Per request the dispatcher runs, in order:
//!
//! 1. option resolution: bootstrap target, absolute URL, document template
//!    and providers;
//! 2. policy lookup against the [`RouteCacheRegistry`];
//! 3. for a matched policy, a cache read, then on a miss one engine render
//!    followed by a best-effort cache write;
//! 4. for an unmatched path, one engine render with no cache involvement.
//!
//! Concurrent misses for the same cache key are coalesced by default: the
//! first request renders and every request that misses while it is in
//! flight receives its markup, provided the markup was cacheable. A failed
//! or declined render is never handed to another request; those waiters
//! render for themselves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::engine::RenderEngine;
use super::options::{Bootstrap, Provider, RenderOptions, RenderRequest, SetupOptions};
use super::policy::{PolicyLookup, RouteCacheRegistry, RoutePolicy};
use super::template::{TemplateError, TemplateStore};
use crate::Request;
use crate::cache::{CacheError, MemoryRenderCache, RenderCache};

/// Type-erased render error carried by [`SsrError::Render`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by [`SsrDispatcher::render`].
#[derive(Debug, Error)]
pub enum SsrError {
    #[error("a bootstrap target must be supplied at setup or per render call")]
    MissingBootstrap,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("render cache read failed: {0}")]
    CacheRead(#[from] CacheError),

    #[error("render failed: {0}")]
    Render(SharedError),

    #[error("render task failed: {0}")]
    TaskFailed(String),
}

/// In-flight renders keyed by cache key. Only cacheable markup is sent.
#[derive(Default)]
struct InflightRenders {
    pending: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

enum Slot<'a> {
    Leader(InflightGuard<'a>),
    Follower(broadcast::Receiver<String>),
}

impl InflightRenders {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<String>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join(&self, key: &str) -> Slot<'_> {
        let mut pending = self.pending();
        if let Some(sender) = pending.get(key) {
            return Slot::Follower(sender.subscribe());
        }

        let (sender, _) = broadcast::channel(1);
        pending.insert(key.to_owned(), sender);
        Slot::Leader(InflightGuard {
            renders: self,
            key: Some(key.to_owned()),
        })
    }
}

/// Held by the leading render. Dropping it without [`share`](Self::share)
/// closes the channel so waiters fall back to rendering themselves.
struct InflightGuard<'a> {
    renders: &'a InflightRenders,
    key: Option<String>,
}

impl InflightGuard<'_> {
    fn share(mut self, html: &str) {
        if let Some(key) = self.key.take() {
            // Removal and send happen under one lock so a late joiner either
            // subscribes before the send or becomes the next leader.
            let mut pending = self.renders.pending();
            if let Some(sender) = pending.remove(&key) {
                let _ = sender.send(html.to_owned());
            }
        }
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.renders.pending().remove(&key);
        }
    }
}

/// The SSR view hook.
///
/// Holds the setup-time options, the route cache registry, and handles to
/// the render engine, render cache and template store. Cache and template
/// store default to fresh instances; pass shared ones with
/// [`with_cache`](Self::with_cache) and [`with_templates`](Self::with_templates).
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rttp_ssr::ssr::{BoxError, RenderOptions, RenderRequest, RoutePolicy, SetupOptions, SsrDispatcher, engine_fn};
///
/// # async fn example(request: rttp_ssr::Request) -> Result<(), Box<dyn std::error::Error>> {
/// let engine = engine_fn(|request: RenderRequest| async move {
///     Ok::<_, BoxError>(request.document.to_string())
/// });
/// let setup = SetupOptions::new("AppServerModule").route_cache(RoutePolicy::new("/").ttl(30));
/// let dispatcher = SsrDispatcher::new(setup, Arc::new(engine));
///
/// let html = dispatcher.render("dist/browser/index.html", RenderOptions::new(request)).await?;
/// # let _ = html;
/// # Ok(())
/// # }
/// ```
pub struct SsrDispatcher {
    bootstrap: Option<Bootstrap>,
    providers: Vec<Provider>,
    routes: RouteCacheRegistry,
    engine: Arc<dyn RenderEngine>,
    cache: Arc<dyn RenderCache>,
    templates: Arc<TemplateStore>,
    inflight: InflightRenders,
    coalesce_misses: bool,
}

impl SsrDispatcher {
    /// Builds a dispatcher from setup options and an engine.
    ///
    /// Invalid policies are reported once here; requests they match are
    /// rendered without the cache.
    pub fn new(setup: SetupOptions, engine: Arc<dyn RenderEngine>) -> Self {
        let routes = RouteCacheRegistry::new(setup.route_caches);
        for policy in routes.iter() {
            if let Err(err) = policy.validate() {
                warn!(path = %policy.path(), error = %err, "invalid route cache policy");
            }
        }

        Self {
            bootstrap: setup.bootstrap,
            providers: setup.providers,
            routes,
            engine,
            cache: Arc::new(MemoryRenderCache::default()),
            templates: Arc::new(TemplateStore::new()),
            inflight: InflightRenders::default(),
            coalesce_misses: true,
        }
    }

    /// Uses `cache` for rendered pages.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn RenderCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Uses `templates` for document templates.
    #[must_use]
    pub fn with_templates(mut self, templates: Arc<TemplateStore>) -> Self {
        self.templates = templates;
        self
    }

    /// Enables or disables coalescing of concurrent misses for one key.
    ///
    /// When disabled every miss renders and the last cache write wins.
    #[must_use]
    pub fn coalesce_misses(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    /// Renders the document at `file_path` for `options.req`.
    ///
    /// # Errors
    ///
    /// - [`SsrError::MissingBootstrap`] — no bootstrap target at setup or per call;
    ///   the engine is not invoked.
    /// - [`SsrError::Template`] — the document template could not be read.
    /// - [`SsrError::CacheRead`] — the render cache failed on lookup.
    /// - [`SsrError::Render`] — the engine failed; nothing is cached.
    ///
    /// Cache write failures are logged and never returned.
    pub async fn render(
        &self,
        file_path: impl AsRef<Path>,
        options: RenderOptions,
    ) -> Result<String, SsrError> {
        let req = Arc::clone(&options.req);
        let request = self.prepare(file_path.as_ref(), options)?;

        match self.routes.lookup(req.path()) {
            PolicyLookup::Matched(policy) => self.render_cached(policy, &req, request).await,
            PolicyLookup::NoPolicy => self.render_uncached(request).await,
            PolicyLookup::Failed(err) => {
                warn!(path = %req.path(), error = %err, "route cache lookup failed, rendering without cache");
                self.render_uncached(request).await
            }
        }
    }

    /// Renders on a spawned task and reports through `callback`.
    ///
    /// The callback runs exactly once, never before this function returns,
    /// and receives either markup or an error. A panic inside the render is
    /// reported as [`SsrError::TaskFailed`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn render_with_callback<F>(
        self: &Arc<Self>,
        file_path: impl Into<PathBuf>,
        options: RenderOptions,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<String, SsrError>) + Send + 'static,
    {
        let dispatcher = Arc::clone(self);
        let file_path = file_path.into();
        let render = tokio::spawn(async move { dispatcher.render(&file_path, options).await });

        tokio::spawn(async move {
            let result = match render.await {
                Ok(result) => result,
                Err(err) => Err(SsrError::TaskFailed(err.to_string())),
            };
            callback(result);
        })
    }

    fn prepare(&self, file_path: &Path, options: RenderOptions) -> Result<RenderRequest, SsrError> {
        let RenderOptions {
            req,
            res,
            url,
            document,
            bootstrap,
            providers,
        } = options;

        let bootstrap = bootstrap
            .or_else(|| self.bootstrap.clone())
            .ok_or(SsrError::MissingBootstrap)?;
        let url = url.unwrap_or_else(|| resolve_url(&req));
        let document = match document {
            Some(document) => document,
            None => self.templates.get_document(file_path)?,
        };

        let mut bound = Vec::with_capacity(self.providers.len() + providers.len() + 2);
        bound.extend(self.providers.iter().cloned());
        bound.extend(providers);
        bound.push(Provider::Request(req));
        if let Some(res) = res {
            bound.push(Provider::Response(res));
        }

        Ok(RenderRequest {
            bootstrap,
            providers: bound,
            url,
            document,
        })
    }

    async fn render_uncached(&self, request: RenderRequest) -> Result<String, SsrError> {
        self.engine
            .render(request)
            .await
            .map_err(|err| SsrError::Render(Arc::from(err)))
    }

    async fn render_cached(
        &self,
        policy: &RoutePolicy,
        req: &Request,
        request: RenderRequest,
    ) -> Result<String, SsrError> {
        let key = policy.cache_key(req);

        if let Some(html) = self.cache.get(&key).await? {
            debug!(key = %key, "render cache hit");
            return Ok(html);
        }
        debug!(key = %key, "render cache miss");

        let guard = if self.coalesce_misses {
            match self.inflight.join(&key) {
                Slot::Leader(guard) => Some(guard),
                Slot::Follower(receiver) => {
                    return self.await_leader(policy, req, &key, receiver, request).await;
                }
            }
        } else {
            None
        };

        let (outcome, cacheable) = self.render_miss(policy, req, &key, request).await;
        if let (Some(guard), Ok(html), true) = (guard, &outcome, cacheable) {
            guard.share(html);
        }
        outcome
    }

    /// Renders one miss and stores the markup if the policy accepts it.
    /// Returns whether the markup was cacheable.
    async fn render_miss(
        &self,
        policy: &RoutePolicy,
        req: &Request,
        key: &str,
        request: RenderRequest,
    ) -> (Result<String, SsrError>, bool) {
        let url = request.url.clone();
        let html = match self.render_uncached(request).await {
            Ok(html) => html,
            Err(err) => return (Err(err), false),
        };

        if !policy.is_cacheable(&url, req) {
            debug!(key = %key, url = %url, "render result declined by cacheability predicate");
            return (Ok(html), false);
        }
        self.store(key, &html, policy).await;
        (Ok(html), true)
    }

    async fn await_leader(
        &self,
        policy: &RoutePolicy,
        req: &Request,
        key: &str,
        mut receiver: broadcast::Receiver<String>,
        request: RenderRequest,
    ) -> Result<String, SsrError> {
        match receiver.recv().await {
            Ok(html) => {
                debug!(key = %key, "joined in-flight render");
                Ok(html)
            }
            Err(_) => {
                debug!(key = %key, "in-flight render not shared, rendering directly");
                self.render_miss(policy, req, key, request).await.0
            }
        }
    }

    async fn store(&self, key: &str, html: &str, policy: &RoutePolicy) {
        let ttl = policy.ttl_duration();
        match self.cache.set(key, html.to_owned(), ttl).await {
            Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "stored rendered page"),
            Err(err) => warn!(key = %key, error = %err, "could not cache the rendered page"),
        }
    }
}

/// `{protocol}://{host}{original_url}`; an absent host contributes nothing.
fn resolve_url(req: &Request) -> String {
    format!(
        "{}://{}{}",
        req.protocol(),
        req.host().unwrap_or_default(),
        req.original_url()
    )
}
