use crate::domain::report::{ReportDocument, RunMode};
use crate::error::ReportError;
use crate::pipeline::generator::ReportGenerator;
use crate::pipeline::{JobEvent, JobStatus};
use anyhow::Context;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_RETENTION_SECS: u64 = 30;

/// Single-flight control plus progress fan-out. At most one generation runs
/// per date; concurrent triggers for the same date join the running job.
#[derive(Clone)]
pub struct GenerationCoordinator {
    generator: Arc<ReportGenerator>,
    jobs: Arc<Mutex<HashMap<NaiveDate, JobHandle>>>,
    retention: Duration,
}

impl GenerationCoordinator {
    pub fn new(generator: Arc<ReportGenerator>) -> Self {
        let retention = std::env::var("JOB_RETENTION_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETENTION_SECS);

        Self {
            generator,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            retention: Duration::from_secs(retention),
        }
    }

    #[cfg(test)]
    fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Start a job for `date`, or join the one already running. The bool is
    /// false when an existing job was joined.
    pub async fn trigger(&self, date: NaiveDate, run_mode: RunMode) -> (JobHandle, bool) {
        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.get(&date) {
            if existing.status() == JobStatus::Running {
                tracing::info!(%date, job_id = %existing.id, "generation already running; joining existing job");
                return (existing.clone(), false);
            }
        }

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let handle = JobHandle {
            id: Uuid::new_v4(),
            date,
            run_mode,
            events: events_tx.clone(),
            outcome: outcome_rx,
        };
        jobs.insert(date, handle.clone());
        drop(jobs);

        tracing::info!(%date, job_id = %handle.id, %run_mode, "starting generation job");

        let generator = self.generator.clone();
        let jobs_map = self.jobs.clone();
        let retention = self.retention;
        let job_id = handle.id;
        tokio::spawn(async move {
            let outcome = match generator.generate(date, run_mode, &events_tx).await {
                Ok(document) => {
                    let _ = events_tx.send(JobEvent::completed(document.clone()));
                    tracing::info!(%date, %job_id, "report generation succeeded");
                    JobOutcome::Succeeded(document)
                }
                Err(err) => {
                    let failure = JobFailure::from_error(&err);
                    let _ = events_tx.send(JobEvent::failed(failure.detail.clone()));
                    tracing::error!(%date, %job_id, error = %failure.detail, "report generation failed");
                    JobOutcome::Failed(failure)
                }
            };
            let _ = outcome_tx.send(Some(outcome));

            // Keep the terminal outcome visible to late subscribers briefly.
            tokio::time::sleep(retention).await;
            let mut jobs = jobs_map.lock().await;
            if jobs.get(&date).map(|j| j.id) == Some(job_id) {
                jobs.remove(&date);
            }
        });

        (handle, true)
    }

    /// Start (or join) the job for `date` and block until its terminal state.
    pub async fn run_sync(
        &self,
        date: NaiveDate,
        run_mode: RunMode,
    ) -> anyhow::Result<ReportDocument> {
        let (handle, _started) = self.trigger(date, run_mode).await;
        let mut outcome = handle.outcome.clone();
        let resolved = outcome
            .wait_for(|o| o.is_some())
            .await
            .context("generation task dropped before reporting an outcome")?
            .clone();

        match resolved {
            Some(JobOutcome::Succeeded(document)) => Ok(document),
            Some(JobOutcome::Failed(failure)) => Err(failure.into_error()),
            None => Err(anyhow::anyhow!("generation finished without an outcome")),
        }
    }

    /// Subscribe to the job for `date`. `None` when nothing is live (and any
    /// previous job has aged out of the retention window).
    pub async fn subscribe(&self, date: NaiveDate) -> Option<JobSubscription> {
        let jobs = self.jobs.lock().await;
        jobs.get(&date).map(JobHandle::subscribe)
    }
}

#[derive(Clone)]
pub struct JobHandle {
    pub id: Uuid,
    pub date: NaiveDate,
    pub run_mode: RunMode,
    events: broadcast::Sender<JobEvent>,
    outcome: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        match &*self.outcome.borrow() {
            None => JobStatus::Running,
            Some(JobOutcome::Succeeded(_)) => JobStatus::Succeeded,
            Some(JobOutcome::Failed(_)) => JobStatus::Failed,
        }
    }

    pub fn subscribe(&self) -> JobSubscription {
        JobSubscription {
            events: self.events.subscribe(),
            outcome: self.outcome.clone(),
            finished: false,
        }
    }
}

#[derive(Debug, Clone)]
enum JobOutcome {
    Succeeded(ReportDocument),
    Failed(JobFailure),
}

#[derive(Debug, Clone)]
struct JobFailure {
    detail: String,
    kind: Option<ReportError>,
}

impl JobFailure {
    fn from_error(err: &anyhow::Error) -> Self {
        Self {
            detail: format!("{err:#}"),
            kind: err.downcast_ref::<ReportError>().cloned(),
        }
    }

    fn into_error(self) -> anyhow::Error {
        match self.kind {
            Some(kind) => anyhow::Error::new(kind),
            None => anyhow::anyhow!(self.detail),
        }
    }
}

/// One observer's cursor into a job's event sequence. Yields broadcast
/// progress events, then exactly one terminal event; late subscribers that
/// missed the broadcast terminal get it synthesized from the recorded
/// outcome. Dropping a subscription never affects the job.
pub struct JobSubscription {
    events: broadcast::Receiver<JobEvent>,
    outcome: watch::Receiver<Option<JobOutcome>>,
    finished: bool,
}

impl JobSubscription {
    /// Next event in order; `None` once the terminal event has been
    /// delivered.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }

        loop {
            let from_outcome = tokio::select! {
                // Pending broadcast events win over the recorded outcome so
                // the terminal event stays last.
                biased;
                recv = self.events.recv() => match recv {
                    Ok(event) => {
                        if event.is_terminal() {
                            self.finished = true;
                        }
                        return Some(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "progress subscriber lagged; skipping");
                        false
                    }
                    Err(broadcast::error::RecvError::Closed) => true,
                },
                _ = self.outcome.wait_for(|o| o.is_some()) => true,
            };

            if from_outcome {
                self.finished = true;
                return match self.outcome.borrow().clone() {
                    Some(JobOutcome::Succeeded(document)) => Some(JobEvent::completed(document)),
                    Some(JobOutcome::Failed(failure)) => Some(JobEvent::failed(failure.detail)),
                    None => None,
                };
            }
        }
    }
}
