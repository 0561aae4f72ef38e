//! # rttp-ssr
//!
//! Server-side rendering adapter with a route-keyed render cache, served by
//! a from-scratch async HTTP/1.1 server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rttp_ssr::server::Server;
//! use rttp_ssr::ssr::{BoxError, RenderRequest, RoutePolicy, SetupOptions, SsrDispatcher, SsrView, engine_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = engine_fn(|request: RenderRequest| async move {
//!         let body = format!("<app-root>{}</app-root>", request.url);
//!         Ok::<_, BoxError>(request.document.replace("<app-root></app-root>", &body))
//!     });
//!     let setup = SetupOptions::new("AppServerModule").route_cache(RoutePolicy::new("/").ttl(30));
//!     let view = SsrView::new(
//!         Arc::new(SsrDispatcher::new(setup, Arc::new(engine))),
//!         "dist/browser/index.html",
//!     );
//!
//!     let server = Server::bind("127.0.0.1:4000").await?;
//!     server.run(move |req| {
//!         let view = view.clone();
//!         async move { view.handle(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod http;
pub mod server;
pub mod ssr;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
