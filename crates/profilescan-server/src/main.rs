mod api;
mod events;
mod middleware;
mod orchestrator;
mod recommender;
mod store;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use profilescan_advisor::AdvisorClient;
use profilescan_places::PlacesClient;

use crate::{
    api::{build_app, AppState},
    events::{relay_scan_updates, ScanEvents},
    middleware::{PgRateLimitStore, RateLimitState},
    orchestrator::ScanOrchestrator,
    recommender::Recommender,
    store::{PgScanStore, ScanStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = profilescan_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = profilescan_db::PoolConfig::from_app_config(&config);
    let pool = profilescan_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = profilescan_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database migrations up to date");

    let places = PlacesClient::with_base_url(
        config.places_api_key.as_deref(),
        config.http_timeout_secs,
        &config.places_base_url,
    )?
    .with_search_radius_km(config.search_radius_km);
    if config.places_api_key.is_none() {
        tracing::warn!("GOOGLE_PLACES_API_KEY is not set; scans will fail until it is configured");
    }

    let advisor = AdvisorClient::with_base_url(
        config.advisor_api_key.as_deref(),
        config.http_timeout_secs,
        &config.advisor_base_url,
        &config.advisor_model,
    )?;
    if !advisor.is_configured() {
        tracing::warn!("advisor API key is not set; recommendations will use the rule-based fallback");
    }

    let store: Arc<dyn ScanStore> = Arc::new(PgScanStore::new(pool.clone()));
    let recommender = Arc::new(Recommender::new(
        Arc::new(advisor),
        Arc::clone(&store),
        Duration::from_secs(config.recommendation_timeout_secs),
    ));
    let orchestrator = Arc::new(ScanOrchestrator::new(
        Arc::new(places),
        Arc::clone(&store),
        Arc::clone(&recommender),
    ));
    let events = ScanEvents::new();

    let window = Duration::from_secs(config.rate_limit_window_secs);
    let rate_limit = RateLimitState::new(
        Arc::new(PgRateLimitStore::new(pool.clone())),
        config.rate_limit_max_requests,
        window,
    )
    .with_trusted_proxies(config.trusted_proxies.clone());

    let shutdown = CancellationToken::new();
    let relay = tokio::spawn(relay_scan_updates(
        pool.clone(),
        events.clone(),
        shutdown.clone(),
    ));
    let pruner = tokio::spawn(prune_rate_limits(pool, window, shutdown.clone()));

    let app = build_app(
        AppState {
            store,
            orchestrator,
            recommender,
            events,
        },
        rate_limit,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "profilescan server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    let _ = tokio::join!(relay, pruner);
    Ok(())
}

/// Deletes rate-limit windows that can no longer be counted against.
async fn prune_rate_limits(pool: PgPool, window: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(window.max(Duration::from_secs(60)));
    let keep = chrono::Duration::from_std(window * 2).unwrap_or(chrono::Duration::minutes(2));

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }
        let cutoff = chrono::Utc::now() - keep;
        match profilescan_db::prune_rate_limit_hits(&pool, cutoff).await {
            Ok(0) => {}
            Ok(deleted) => tracing::debug!(deleted, "pruned expired rate limit windows"),
            Err(e) => tracing::warn!(error = %e, "failed to prune rate limit windows"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
