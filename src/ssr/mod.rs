//! Server-side rendering adapter.
//!
//! Renders single-page application documents on the server for every
//! request and, for routes registered with a [`RoutePolicy`], serves the
//! rendered markup from a [`RenderCache`](crate::cache::RenderCache) until
//! its TTL runs out.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`TemplateStore`] | reads each document template once per process |
//! | [`RouteCacheRegistry`] | maps exact request paths to caching policies |
//! | [`SsrDispatcher`] | resolves options, consults the cache, calls the engine |
//! | [`RenderEngine`] | external markup producer; adapt closures with [`engine_fn`] |
//! | [`SsrView`] | turns the dispatcher into a server handler |

pub mod dispatcher;
pub mod engine;
pub mod options;
pub mod policy;
pub mod template;
pub mod view;

pub use dispatcher::{SharedError, SsrDispatcher, SsrError};
pub use engine::{BoxError, EngineFn, RenderEngine, RenderFuture, engine_fn};
pub use options::{
    Bootstrap, Provider, REQUEST_TOKEN, RESPONSE_TOKEN, RenderOptions, RenderRequest,
    ResponseHandle, SetupOptions,
};
pub use policy::{
    CacheablePredicate, PolicyError, PolicyLookup, RouteCacheRegistry, RoutePolicy,
    RoutePolicyConfig,
};
pub use template::{DocumentLoader, TemplateError, TemplateStore};
pub use view::SsrView;
