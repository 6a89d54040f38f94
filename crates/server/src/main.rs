//! Wishbox server binary.
//!
//! Thin glue over the library crate: load configuration, initialize Sentry
//! and tracing, build the postgres store, wire the service graph, serve.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wishbox_server::config::WishboxConfig;
use wishbox_server::db;
use wishbox_server::routes;
use wishbox_server::state::AppState;
use wishbox_server::store::postgres::PgStore;

/// Start Sentry when a DSN is configured. The returned guard flushes
/// pending events on drop, so it lives for the whole of `main`.
fn init_sentry(config: &WishboxConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_deref()?;
    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));
    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Map tracing levels onto Sentry: warnings and errors become events,
/// info and debug become breadcrumbs on whatever event follows.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    use sentry_tracing::EventFilter;
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = WishboxConfig::from_env().expect("configuration must load");

    // Sentry before the tracing subscriber so its layer can hook in.
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wishbox_server=info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("database pool must connect");
    tracing::info!("database pool ready");

    // Migrations are not applied here; run `wishbox-cli migrate` first.

    let store = Arc::new(PgStore::new(pool));
    let state = AppState::new(config.clone(), store.clone(), store);

    let app = routes::router(state)
        .layer(axum::middleware::from_fn(
            wishbox_server::middleware::request_id_middleware,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // Sentry layers outermost so every request is covered.
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!(%addr, "wishbox listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("listen address must bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server exited with an error");
}

/// Resolve when either Ctrl+C or SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler must install");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.expect("Ctrl+C handler must install");
        }
        () = terminate => {}
    }

    tracing::info!("shutdown signal received, draining connections");
}
