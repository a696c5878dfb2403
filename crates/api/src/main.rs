use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riskbrief_core::config::Settings;
use riskbrief_core::configstore::ConfigStore;
use riskbrief_core::llm::ark::ArkClient;
use riskbrief_core::llm::ModelClient;
use riskbrief_core::market::{HttpJsonMarketData, MarketDataClient};
use riskbrief_core::pipeline::coordinator::GenerationCoordinator;
use riskbrief_core::pipeline::generator::ReportGenerator;
use riskbrief_core::sched::Scheduler;
use riskbrief_core::store::ReportStore;

mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store = ReportStore::from_settings(&settings);
    store.ensure_dirs().await?;

    let config_store = ConfigStore::load(&settings).await?;

    let coordinator = match build_coordinator(&settings, store.clone()) {
        Ok(coordinator) => {
            let scheduler = Scheduler::new(coordinator.clone(), config_store.subscribe());
            tokio::spawn(scheduler.run());
            Some(coordinator)
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "generation clients unavailable; starting API in read-only mode");
            None
        }
    };

    let state = routes::AppState {
        store,
        coordinator,
        config: config_store,
        app_env: settings.app_env.clone(),
    };

    let app = routes::router(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3008);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, env = %settings.app_env, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_coordinator(
    settings: &Settings,
    store: ReportStore,
) -> anyhow::Result<GenerationCoordinator> {
    let market: Arc<dyn MarketDataClient> = Arc::new(HttpJsonMarketData::from_settings(settings)?);
    let model: Arc<dyn ModelClient> = Arc::new(ArkClient::from_settings(settings)?);
    let generator = Arc::new(ReportGenerator::new(
        market,
        model,
        store,
        settings.debug_capture,
    ));
    Ok(GenerationCoordinator::new(generator))
}

fn cors_layer() -> CorsLayer {
    let origins: Vec<axum::http::HeaderValue> = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173".to_string())
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
