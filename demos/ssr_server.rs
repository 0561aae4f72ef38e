//! Serves a document template through a toy render engine.
//!
//! ```text
//! RUST_LOG=rttp_ssr=debug cargo run --example ssr_server -- ssr.json
//! ```
//!
//! Without a config path the defaults apply: `127.0.0.1:4000`, document
//! `dist/browser/index.html`, and `/` cached for 60 seconds.

use std::sync::Arc;

use rttp_ssr::config::SsrConfig;
use rttp_ssr::server::Server;
use rttp_ssr::ssr::{
    BoxError, Provider, RenderRequest, RoutePolicy, SsrDispatcher, SsrView, engine_fn,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SsrConfig::from_file(path)?,
        None => SsrConfig {
            bootstrap: Some("AppServerModule".to_owned()),
            ..SsrConfig::default()
        },
    };

    let mut setup = config
        .setup_options()
        .provider(Provider::value("SERVER_NAME", "rttp-ssr demo"));
    if setup.route_caches.is_empty() {
        setup = setup.route_cache(RoutePolicy::new("/"));
    }

    // Stands in for a real application renderer.
    let engine = engine_fn(|request: RenderRequest| async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let body = format!(
            "<app-root data-bootstrap=\"{}\"><p>Rendered {}</p></app-root>",
            request.bootstrap, request.url
        );
        Ok::<_, BoxError>(request.document.replace("<app-root></app-root>", &body))
    });

    let dispatcher = SsrDispatcher::new(setup, Arc::new(engine))
        .with_cache(Arc::new(config.render_cache()))
        .coalesce_misses(config.coalesce_misses);
    let view = SsrView::new(Arc::new(dispatcher), config.document.clone());

    let server = Server::bind(&config.bind).await?;
    server
        .run_until(
            move |req| {
                let view = view.clone();
                async move { view.handle(req).await }
            },
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        )
        .await?;
    Ok(())
}
