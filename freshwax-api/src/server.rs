//! Server bootstrap: adapter selection, service wiring, background
//! tasks, and graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use freshwax_core::bootstrap::Services;
use freshwax_core::clock::SystemClock;
use freshwax_core::pubsub::{EventPublisher, LocalBus, PusherCredentials, PusherTransport};
use freshwax_core::service::RateLimiter;
use freshwax_core::store::{DocumentStore, MemoryStore, PostgresStore};
use freshwax_core::Config;

use crate::http::{router, AppState};
use crate::tasks::spawn_background_tasks;

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store.backend.as_str() {
        "memory" => {
            info!("using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        "postgres" => {
            let store = PostgresStore::connect(
                &config.store.postgres_url,
                config.store.max_connections,
            )
            .await
            .context("connecting to Postgres")?;
            store.migrate().await.context("running store migration")?;
            info!("using Postgres document store");
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown store backend: {other}"),
    }
}

fn build_publisher(
    config: &Config,
    clock: Arc<SystemClock>,
) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match config.pubsub.backend.as_str() {
        "local" => {
            info!("using in-process event bus");
            Ok(Arc::new(LocalBus::default()))
        }
        "pusher" => {
            let transport = PusherTransport::new(
                PusherCredentials {
                    host: config.pubsub.host.clone(),
                    app_id: config.pubsub.app_id.clone(),
                    key: config.pubsub.key.clone(),
                    secret: config.pubsub.secret.clone(),
                },
                clock,
            )?;
            info!("using Pusher-compatible event transport");
            Ok(Arc::new(transport))
        }
        other => anyhow::bail!("unknown pubsub backend: {other}"),
    }
}

async fn build_rate_limiter(config: &Config) -> RateLimiter {
    let Some(url) = config.redis.url_opt() else {
        return RateLimiter::in_memory();
    };
    match redis::Client::open(url) {
        Ok(client) => match redis::aio::ConnectionManager::new(client).await {
            Ok(conn) => {
                info!("rate limiting backed by Redis");
                RateLimiter::new(Some(conn))
            }
            Err(err) => {
                tracing::warn!(error = %err, "Redis unreachable, per-instance rate limiting");
                RateLimiter::in_memory()
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "bad Redis URL, per-instance rate limiting");
            RateLimiter::in_memory()
        }
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock);
    let store = build_store(&config).await?;
    let publisher = build_publisher(&config, clock.clone())?;
    let rate_limiter = build_rate_limiter(&config).await;

    let services = Services::build(
        &config,
        store.clone(),
        publisher,
        clock,
        rate_limiter,
    )?;

    let cancel = CancellationToken::new();
    let tasks = spawn_background_tasks(services.clone(), cancel.clone());

    let state = AppState {
        services,
        store,
        config: Arc::new(config.clone()),
    };
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "freshwax broadcast core listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("http server")?;

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    info!("shutdown complete");
    Ok(())
}
