use std::{process, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use scudo::{
    cache::{CacheConfig, CacheState},
    config::{self, Settings},
    governor::{GovernorConfig, GovernorState, PgSessionCatalog, Sweeper},
    infra::{self, InfraError, telemetry},
    observer::{ObserverConfig, ObserverState},
    pipeline,
};
use sqlx::PgPool;
use tracing::{dispatcher, error, info};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
    } else {
        eprintln!("scudo: {error}");
    }
}

async fn run() -> Result<(), InfraError> {
    let (_cli, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let url = settings
        .database
        .url
        .clone()
        .ok_or(InfraError::MissingDatabaseUrl)?;
    let pool = infra::db::connect(
        &url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await?;

    let app = build_app(pool.clone(), &settings);

    info!(addr = %settings.server.addr, "scudo listening");
    let listener = tokio::net::TcpListener::bind(settings.server.addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight work drain before the pool goes away.
    let _ = tokio::time::timeout(settings.server.graceful_shutdown, pool.close()).await;
    Ok(())
}

fn build_app(pool: PgPool, settings: &Settings) -> Router {
    let cache = CacheState::in_process(CacheConfig::from(&settings.cache));
    let observer = ObserverState::new(ObserverConfig::from(&settings.observer));
    let catalog = Arc::new(PgSessionCatalog::new(pool.clone()));
    let sweeper = Arc::new(Sweeper::new(catalog, GovernorConfig::from(&settings.governor)));
    let governor = GovernorState::new(pool.clone(), sweeper);

    let router = Router::new()
        .route("/", get(service_info))
        .route("/_health/db", get(db_health))
        .with_state(pool);

    pipeline::apply_stages(router, governor, cache, observer)
}

async fn service_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "scudo",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn db_health(State(pool): State<PgPool>) -> impl IntoResponse {
    match infra::db::health_check(&pool).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(err) => {
            error!(error = %err, "database health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
