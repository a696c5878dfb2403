use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riskbrief_core::config::Settings;
use riskbrief_core::domain::report::RunMode;
use riskbrief_core::llm::ark::ArkClient;
use riskbrief_core::llm::ModelClient;
use riskbrief_core::market::{HttpJsonMarketData, MarketDataClient};
use riskbrief_core::pipeline::generator::ReportGenerator;
use riskbrief_core::pipeline::JobEvent;
use riskbrief_core::store::ReportStore;
use riskbrief_core::time::resolve_report_date;

#[derive(Debug, Parser)]
#[command(name = "riskbrief_worker")]
struct Args {
    /// Report date (YYYY-MM-DD). Defaults to today's market (CST) date.
    #[arg(long)]
    date: Option<String>,

    /// Trigger tag recorded on the document
    /// (pre_market|midday|post_market|manual).
    #[arg(long, default_value = "manual")]
    run_mode: String,

    /// Do everything except writing to the report store.
    #[arg(long)]
    dry_run: bool,
}

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

    let args = Args::parse();

    let date = resolve_report_date(args.date.as_deref(), chrono::Utc::now())?;
    let run_mode = RunMode::parse(&args.run_mode)?;

    let store = ReportStore::from_settings(&settings);
    let market: Arc<dyn MarketDataClient> = Arc::new(HttpJsonMarketData::from_settings(&settings)?);
    let model: Arc<dyn ModelClient> = Arc::new(ArkClient::from_settings(&settings)?);
    let generator = ReportGenerator::new(market, model, store, settings.debug_capture);

    let (events_tx, mut events_rx) = broadcast::channel(64);
    let progress = tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            if let JobEvent::Progress {
                percent,
                title,
                detail,
            } = event
            {
                tracing::info!(percent, %title, %detail, "progress");
            }
        }
    });

    let result = if args.dry_run {
        generator.dry_run(date, run_mode, &events_tx).await
    } else {
        generator.generate(date, run_mode, &events_tx).await
    };
    drop(events_tx);
    let _ = progress.await;

    match result {
        Ok(document) => {
            tracing::info!(
                %date,
                %run_mode,
                dry_run = args.dry_run,
                scenarios = document.scenarios.len(),
                "report generated"
            );
            if args.dry_run {
                tracing::info!("dry-run: document not persisted");
            }
            Ok(())
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%date, error = %format!("{err:#}"), "report generation failed");
            Err(err)
        }
    }
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
