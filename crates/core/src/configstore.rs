use crate::config::Settings;
use crate::error::ReportError;
use crate::store::write_atomic;
use anyhow::Context;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

const TIME_FORMAT: &str = "%H:%M";

pub const DEFAULT_SCHEDULE_TIMES: [&str; 3] = ["09:25", "12:30", "15:10"];

/// Times of day (market-local) at which generation for "today" fires.
/// Always ascending and de-duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(with = "hhmm")]
    pub schedule_times: Vec<NaiveTime>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let schedule_times = DEFAULT_SCHEDULE_TIMES
            .iter()
            .map(|s| NaiveTime::parse_from_str(s, TIME_FORMAT).expect("default times are valid"))
            .collect();
        Self { schedule_times }
    }
}

/// Validate and normalize raw `HH:MM` strings: well-formed, non-empty,
/// de-duplicated, ascending. Violations surface as `InvalidConfig`.
pub fn normalize_schedule_times(times: &[String]) -> anyhow::Result<Vec<NaiveTime>> {
    if times.is_empty() {
        return Err(invalid("schedule_times must not be empty"));
    }

    let mut out = BTreeSet::new();
    for raw in times {
        let parsed = NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
            .map_err(|_| invalid(format!("invalid time {raw:?}, expected HH:MM")))?;
        out.insert(parsed);
    }
    Ok(out.into_iter().collect())
}

fn invalid(detail: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(ReportError::InvalidConfig(detail.into()))
}

/// Owns the persisted schedule config for one environment and publishes
/// updates to the running scheduler.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    tx: Arc<watch::Sender<ScheduleConfig>>,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigStore {
    /// Load `CONFIG_DIR/{APP_ENV}.json`, creating it with defaults when
    /// absent.
    pub async fn load(settings: &Settings) -> anyhow::Result<Self> {
        let path = settings.config_dir.join(format!("{}.json", settings.app_env));
        tokio::fs::create_dir_all(&settings.config_dir)
            .await
            .with_context(|| {
                format!("failed to create config dir {}", settings.config_dir.display())
            })?;

        let config = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<ScheduleConfig>(&bytes)
                .with_context(|| format!("failed to decode config {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = ScheduleConfig::default();
                persist(&path, &config).await?;
                tracing::info!(path = %path.display(), "wrote default schedule config");
                config
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config {}", path.display()))
            }
        };

        let (tx, _) = watch::channel(config);
        Ok(Self {
            path,
            tx: Arc::new(tx),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn get(&self) -> ScheduleConfig {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScheduleConfig> {
        self.tx.subscribe()
    }

    /// Validate, persist, and publish a new schedule. The stored value is
    /// untouched when validation or persistence fails.
    pub async fn update(&self, times: &[String]) -> anyhow::Result<ScheduleConfig> {
        let schedule_times = normalize_schedule_times(times)?;
        let config = ScheduleConfig { schedule_times };

        let _guard = self.write_lock.lock().await;
        persist(&self.path, &config).await?;
        self.tx.send_replace(config.clone());
        tracing::info!(times = ?times, "schedule config updated");
        Ok(config)
    }
}

async fn persist(path: &std::path::Path, config: &ScheduleConfig) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(config).context("failed to encode config")?;
    write_atomic(path, &bytes).await
}

mod hhmm {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(times: &[NaiveTime], ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_seq(times.iter().map(|t| t.format(TIME_FORMAT).to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<NaiveTime>, D::Error> {
        let raw = Vec::<String>::deserialize(de)?;
        raw.iter()
            .map(|s| {
                NaiveTime::parse_from_str(s, TIME_FORMAT)
                    .map_err(|_| D::Error::custom(format!("invalid time {s:?}, expected HH:MM")))
            })
            .collect()
    }
}
