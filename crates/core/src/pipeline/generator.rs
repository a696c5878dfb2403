use crate::domain::report::{ReportDocument, RunMode};
use crate::error::ReportError;
use crate::llm::{self, ModelClient};
use crate::market::MarketDataClient;
use crate::pipeline::JobEvent;
use crate::store::ReportStore;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Orchestrates one generation run: market fetch, model call, validation,
/// atomic persistence. Emits intermediate progress events on `events`;
/// failures propagate as errors and never leave a partial document behind.
pub struct ReportGenerator {
    market: Arc<dyn MarketDataClient>,
    model: Arc<dyn ModelClient>,
    store: ReportStore,
    debug_capture: bool,
}

impl ReportGenerator {
    pub fn new(
        market: Arc<dyn MarketDataClient>,
        model: Arc<dyn ModelClient>,
        store: ReportStore,
        debug_capture: bool,
    ) -> Self {
        Self {
            market,
            model,
            store,
            debug_capture,
        }
    }

    pub async fn generate(
        &self,
        date: NaiveDate,
        run_mode: RunMode,
        events: &broadcast::Sender<JobEvent>,
    ) -> anyhow::Result<ReportDocument> {
        self.run(date, run_mode, events, true).await
    }

    /// Full run without persistence (and without a debug log on disk).
    pub async fn dry_run(
        &self,
        date: NaiveDate,
        run_mode: RunMode,
        events: &broadcast::Sender<JobEvent>,
    ) -> anyhow::Result<ReportDocument> {
        self.run(date, run_mode, events, false).await
    }

    async fn run(
        &self,
        date: NaiveDate,
        run_mode: RunMode,
        events: &broadcast::Sender<JobEvent>,
        persist: bool,
    ) -> anyhow::Result<ReportDocument> {
        let mut trace = DebugTrace::new(self.debug_capture && persist);

        let result = self.run_stages(date, run_mode, events, persist, &mut trace).await;

        if let Err(err) = &result {
            trace.push(format!("run failed: {err:#}"));
        }
        if let Err(log_err) = trace.flush(&self.store, date).await {
            tracing::warn!(%date, error = %log_err, "failed to write debug log");
        }

        result
    }

    async fn run_stages(
        &self,
        date: NaiveDate,
        run_mode: RunMode,
        events: &broadcast::Sender<JobEvent>,
        persist: bool,
        trace: &mut DebugTrace,
    ) -> anyhow::Result<ReportDocument> {
        emit(
            events,
            JobEvent::progress(5, "start", format!("starting {run_mode} generation for {date}")),
        );
        trace.push(format!(
            "start: date={date} run_mode={run_mode} market={} model={}",
            self.market.provider_name(),
            self.model.provider_name()
        ));

        let snapshot = self
            .market
            .fetch_snapshot(date)
            .await
            .map_err(|e| ReportError::classify(e, ReportError::DataUnavailable))?;
        trace.push(format!(
            "snapshot fetched: index_close={} pct_change={}",
            snapshot.index_close, snapshot.index_pct_change
        ));
        emit(
            events,
            JobEvent::progress(30, "market_data", "market snapshot fetched"),
        );

        let system = llm::prompt::system_prompt();
        let user = llm::prompt::user_prompt(&snapshot, run_mode);
        emit(
            events,
            JobEvent::progress(40, "model", "requesting scenario analysis from the model"),
        );

        let raw = self
            .model
            .complete(&system, &user)
            .await
            .map_err(|e| ReportError::classify(e, ReportError::ModelError))?;
        trace.push(format!("model responded: {} bytes", raw.len()));
        emit(
            events,
            JobEvent::progress(70, "parse", "validating model response"),
        );

        let (scenarios, narrative_raw) = llm::json::parse_report(&raw)?;
        trace.push(format!("validated: {} scenarios", scenarios.len()));

        let document = ReportDocument {
            date,
            generated_at: Utc::now(),
            run_mode,
            market_snapshot: snapshot,
            scenarios,
            narrative_raw,
        };

        if persist {
            emit(
                events,
                JobEvent::progress(90, "persist", "writing report document"),
            );
            self.store.write(&document).await?;
            trace.push("document persisted".to_string());
        }

        Ok(document)
    }
}

fn emit(events: &broadcast::Sender<JobEvent>, event: JobEvent) {
    // No subscribers is fine; generation does not depend on observers.
    let _ = events.send(event);
}

/// Per-run stage log, written through the store when capture is enabled.
struct DebugTrace {
    enabled: bool,
    lines: Vec<String>,
}

impl DebugTrace {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, line: String) {
        if self.enabled {
            self.lines.push(format!("{} {line}", Utc::now().to_rfc3339()));
        }
    }

    async fn flush(&self, store: &ReportStore, date: NaiveDate) -> anyhow::Result<()> {
        if !self.enabled || self.lines.is_empty() {
            return Ok(());
        }
        store.write_debug_log(date, &self.lines.join("\n")).await
    }
}
