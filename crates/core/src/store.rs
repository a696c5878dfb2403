use crate::config::Settings;
use crate::domain::report::ReportDocument;
use crate::error::ReportError;
use anyhow::Context;
use chrono::NaiveDate;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// File-per-date report store. Writers go through a temp-file + rename so a
/// concurrent reader never observes a half-written document.
#[derive(Debug, Clone)]
pub struct ReportStore {
    data_dir: PathBuf,
}

impl ReportStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.data_dir.clone())
    }

    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", self.data_dir.display()))
    }

    fn document_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(format!("{date}.json"))
    }

    fn text_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(format!("{date}.txt"))
    }

    fn debug_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir.join(format!("{date}.debug.log"))
    }

    pub async fn exists(&self, date: NaiveDate) -> bool {
        tokio::fs::try_exists(self.document_path(date))
            .await
            .unwrap_or(false)
    }

    pub async fn read(&self, date: NaiveDate) -> anyhow::Result<ReportDocument> {
        let bytes = self.read_raw(date).await?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode stored report for {date}"))
    }

    pub async fn read_raw(&self, date: NaiveDate) -> anyhow::Result<Vec<u8>> {
        read_or_not_found(&self.document_path(date), date).await
    }

    pub async fn read_text(&self, date: NaiveDate) -> anyhow::Result<String> {
        let bytes = read_or_not_found(&self.text_path(date), date).await?;
        String::from_utf8(bytes).with_context(|| format!("report text for {date} is not UTF-8"))
    }

    pub async fn read_debug_log(&self, date: NaiveDate) -> anyhow::Result<String> {
        let bytes = read_or_not_found(&self.debug_path(date), date).await?;
        String::from_utf8(bytes).with_context(|| format!("debug log for {date} is not UTF-8"))
    }

    /// Atomic replace of the document and its narrative sidecar.
    pub async fn write(&self, document: &ReportDocument) -> anyhow::Result<()> {
        self.ensure_dirs().await?;

        let bytes = serde_json::to_vec_pretty(document).context("failed to encode report")?;
        write_atomic(&self.document_path(document.date), &bytes).await?;
        write_atomic(
            &self.text_path(document.date),
            document.narrative_raw.as_bytes(),
        )
        .await?;
        Ok(())
    }

    pub async fn write_debug_log(&self, date: NaiveDate, contents: &str) -> anyhow::Result<()> {
        self.ensure_dirs().await?;
        write_atomic(&self.debug_path(date), contents.as_bytes()).await
    }

    /// Dates with a stored document, descending. Non-date files are ignored.
    pub async fn list(&self) -> anyhow::Result<Vec<NaiveDate>> {
        let mut dates = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dates),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to list data dir {}", self.data_dir.display())
                })
            }
        };

        while let Some(entry) = entries.next_entry().await.context("failed to read data dir")? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, DATE_FORMAT) {
                dates.push(date);
            }
        }

        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }
}

async fn read_or_not_found(path: &Path, date: NaiveDate) -> anyhow::Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ReportError::NotFound(date).into())
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Write to a sibling temp file, then rename into place.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut tmp_name: OsString = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to move {} into place", tmp.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::{RunMode, Scenario};
    use crate::market::types::{MarketSnapshot, SectorBreakdown, SectorHeat};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn document(date: NaiveDate) -> ReportDocument {
        ReportDocument {
            date,
            generated_at: Utc::now(),
            run_mode: RunMode::Manual,
            market_snapshot: MarketSnapshot {
                as_of_date: date,
                captured_at: Utc::now(),
                index_close: 4077.72,
                index_pct_change: -0.2,
                turnover_estimate: "3.45".to_string(),
                leverage_ratio: 2.53,
                main_net_inflow: -633.24,
                retail_net_inflow: 576.26,
                win_rate: 40.9,
                sectors: SectorBreakdown {
                    strong: vec![SectorHeat {
                        name: "煤炭行业".to_string(),
                        heat: 90.3,
                    }],
                    weak: vec![],
                },
                extra: BTreeMap::new(),
            },
            scenarios: vec![Scenario {
                label: "base".to_string(),
                probability: 0.6,
                narrative: "range-bound".to_string(),
            }],
            narrative_raw: "Turnover stays elevated while breadth narrows.".to_string(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let d = date("2026-01-08");

        assert!(!store.exists(d).await);
        store.write(&document(d)).await.unwrap();
        assert!(store.exists(d).await);

        let read = store.read(d).await.unwrap();
        assert_eq!(read.date, d);
        assert_eq!(read.scenarios[0].label, "base");

        let text = store.read_text(d).await.unwrap();
        assert!(text.contains("breadth narrows"));
    }

    #[tokio::test]
    async fn read_missing_date_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let d = date("2099-01-01");

        let err = store.read(d).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::NotFound(missing)) if *missing == d
        ));
        assert!(store.read_text(d).await.is_err());
        assert!(store.read_debug_log(d).await.is_err());
    }

    #[tokio::test]
    async fn rewrite_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let d = date("2026-01-08");

        store.write(&document(d)).await.unwrap();
        let mut updated = document(d);
        updated.run_mode = RunMode::PostMarket;
        store.write(&updated).await.unwrap();

        let read = store.read(d).await.unwrap();
        assert_eq!(read.run_mode, RunMode::PostMarket);
        // No temp files left behind.
        let mut entries = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["2026-01-08.json", "2026-01-08.txt"]);
    }

    #[tokio::test]
    async fn list_sorts_descending_and_skips_strays() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());

        store.write(&document(date("2026-01-07"))).await.unwrap();
        store.write(&document(date("2026-01-08"))).await.unwrap();
        store.write(&document(date("2025-12-31"))).await.unwrap();
        std::fs::write(dir.path().join("notes.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("2026-01-08.debug.log"), b"trace").unwrap();

        let dates = store.list().await.unwrap();
        assert_eq!(
            dates,
            vec![date("2026-01-08"), date("2026-01-07"), date("2025-12-31")]
        );
    }

    #[tokio::test]
    async fn debug_log_is_independent_of_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let d = date("2026-01-08");

        store.write_debug_log(d, "fetch failed: feed outage").await.unwrap();
        assert!(!store.exists(d).await);
        let log = store.read_debug_log(d).await.unwrap();
        assert!(log.contains("feed outage"));
    }

    #[tokio::test]
    async fn list_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("nested"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
