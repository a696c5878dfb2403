use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use riskbrief_core::configstore::ConfigStore;
use riskbrief_core::domain::report::{ReportDocument, RunMode};
use riskbrief_core::error::ReportError;
use riskbrief_core::pipeline::coordinator::GenerationCoordinator;
use riskbrief_core::store::ReportStore;
use riskbrief_core::time::resolve_report_date;

#[derive(Clone)]
pub struct AppState {
    pub store: ReportStore,
    /// None when generation clients are unconfigured; read endpoints still
    /// work, run endpoints return 503.
    pub coordinator: Option<GenerationCoordinator>,
    pub config: ConfigStore,
    pub app_env: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/reports", get(list_reports))
        .route("/reports/:date", get(get_report))
        .route("/reports/:date/raw", get(get_report_raw))
        .route("/reports/:date/text", get(get_report_text))
        .route("/reports/:date/debug", get(get_report_debug))
        .route("/run", post(run_report))
        .route("/run/stream", get(stream_run))
        .route("/config", get(get_config).post(update_config))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "env": state.app_env}))
}

async fn list_reports(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let dates = state.store.list().await?;
    Ok(Json(json!({"dates": dates})))
}

async fn get_report(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<ReportDocument>, ApiError> {
    let date = parse_date(&date)?;
    let document = state.store.read(date).await?;
    Ok(Json(document))
}

async fn get_report_raw(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Response, ApiError> {
    let date = parse_date(&date)?;
    let bytes = state.store.read_raw(date).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

async fn get_report_text(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<String, ApiError> {
    let date = parse_date(&date)?;
    Ok(state.store.read_text(date).await?)
}

async fn get_report_debug(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<String, ApiError> {
    let date = parse_date(&date)?;
    Ok(state.store.read_debug_log(date).await?)
}

#[derive(Debug, Deserialize)]
struct RunPayload {
    date: Option<String>,
    run_mode: Option<RunMode>,
}

async fn run_report(
    State(state): State<AppState>,
    Json(payload): Json<RunPayload>,
) -> Result<Json<ReportDocument>, ApiError> {
    let Some(coordinator) = &state.coordinator else {
        return Err(ApiError::unavailable());
    };

    let date = resolve_date_arg(payload.date.as_deref())?;
    let run_mode = payload.run_mode.unwrap_or(RunMode::Manual);
    let document = coordinator.run_sync(date, run_mode).await?;
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    date: Option<String>,
}

/// Ordered progress events for the live job, ending with its terminal
/// event. An empty, immediately-closing stream when no job is running.
/// Client disconnect only drops the subscription; the job runs on.
async fn stream_run(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(coordinator) = &state.coordinator else {
        return Err(ApiError::unavailable());
    };

    let date = resolve_date_arg(query.date.as_deref())?;
    let subscription = coordinator.subscribe(date).await;

    let stream = futures::stream::unfold(subscription, |sub| async move {
        let mut sub = sub?;
        let event = sub.next_event().await?;
        let sse = Event::default().event(event.kind()).json_data(&event).ok()?;
        Some((Ok::<_, Infallible>(sse), Some(sub)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"config": state.config.get(), "env": state.app_env}))
}

#[derive(Debug, Deserialize)]
struct ConfigPayload {
    schedule_times: Vec<String>,
}

async fn update_config(
    State(state): State<AppState>,
    Json(payload): Json<ConfigPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config = state.config.update(&payload.schedule_times).await?;
    Ok(Json(json!({"config": config, "env": state.app_env})))
}

fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("invalid date {raw:?}, expected YYYY-MM-DD")))
}

fn resolve_date_arg(arg: Option<&str>) -> Result<NaiveDate, ApiError> {
    resolve_report_date(arg, Utc::now()).map_err(|e| ApiError::bad_request(format!("{e:#}")))
}

pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    fn bad_request(detail: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(detail),
        }
    }

    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error: anyhow::anyhow!("generation is not configured on this instance"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        let status = match error.downcast_ref::<ReportError>() {
            Some(ReportError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(ReportError::InvalidConfig(_)) => StatusCode::BAD_REQUEST,
            Some(
                ReportError::DataUnavailable(_)
                | ReportError::ModelError(_)
                | ReportError::MalformedResponse(_),
            ) => StatusCode::BAD_GATEWAY,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = format!("{:#}", self.error);
        if self.status.is_server_error() {
            sentry_anyhow::capture_anyhow(&self.error);
            tracing::error!(status = %self.status, error = %detail, "request failed");
        }
        (self.status, Json(json!({"error": detail}))).into_response()
    }
}
