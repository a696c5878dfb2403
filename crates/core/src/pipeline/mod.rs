pub mod coordinator;
pub mod generator;

use crate::domain::report::ReportDocument;
use serde::{Deserialize, Serialize};

pub const TERMINAL_PERCENT: u8 = 100;

/// One entry in a job's ordered progress sequence. Percent is
/// non-decreasing; a job emits exactly one terminal event
/// (`completed` or `failed`) and nothing after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        percent: u8,
        title: String,
        detail: String,
    },
    Completed {
        percent: u8,
        document: ReportDocument,
    },
    Failed {
        percent: u8,
        detail: String,
    },
}

impl JobEvent {
    pub fn progress(percent: u8, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Progress {
            percent,
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn completed(document: ReportDocument) -> Self {
        Self::Completed {
            percent: TERMINAL_PERCENT,
            document,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed {
            percent: TERMINAL_PERCENT,
            detail: detail.into(),
        }
    }

    pub fn percent(&self) -> u8 {
        match self {
            Self::Progress { percent, .. }
            | Self::Completed { percent, .. }
            | Self::Failed { percent, .. } => *percent,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::llm::ModelClient;
    use crate::market::types::{MarketSnapshot, SectorBreakdown, SectorHeat};
    use crate::market::MarketDataClient;
    use chrono::{NaiveDate, Utc};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub fn sample_snapshot(as_of_date: NaiveDate) -> MarketSnapshot {
        MarketSnapshot {
            as_of_date,
            captured_at: Utc::now(),
            index_close: 4077.72,
            index_pct_change: -0.2,
            turnover_estimate: "3.45".to_string(),
            leverage_ratio: 2.53,
            main_net_inflow: -633.24,
            retail_net_inflow: 576.26,
            win_rate: 40.9,
            sectors: SectorBreakdown {
                strong: vec![
                    SectorHeat {
                        name: "煤炭行业".to_string(),
                        heat: 90.3,
                    },
                    SectorHeat {
                        name: "化学制药".to_string(),
                        heat: 89.9,
                    },
                ],
                weak: vec![SectorHeat {
                    name: "证券".to_string(),
                    heat: 9.8,
                }],
            },
            extra: BTreeMap::new(),
        }
    }

    pub fn model_report_json() -> String {
        json!({
            "narrative": "Record turnover against a lower close points to distribution; cut leverage first.",
            "scenarios": [
                {"label": "base", "probability": 0.6, "narrative": "range-bound with fading volume"},
                {"label": "optimistic", "probability": 0.25, "narrative": "heavyweights recover on fresh inflows"},
                {"label": "pessimistic", "probability": 0.15, "narrative": "support breaks and selling accelerates"}
            ]
        })
        .to_string()
    }

    pub struct StaticMarket {
        pub delay: Duration,
    }

    #[async_trait::async_trait]
    impl MarketDataClient for StaticMarket {
        fn provider_name(&self) -> &'static str {
            "static_test"
        }

        async fn fetch_snapshot(&self, date: NaiveDate) -> anyhow::Result<MarketSnapshot> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(sample_snapshot(date))
        }
    }

    pub struct FailingMarket;

    #[async_trait::async_trait]
    impl MarketDataClient for FailingMarket {
        fn provider_name(&self) -> &'static str {
            "failing_test"
        }

        async fn fetch_snapshot(&self, _date: NaiveDate) -> anyhow::Result<MarketSnapshot> {
            anyhow::bail!("upstream feed outage")
        }
    }

    pub struct StaticModel {
        pub raw: String,
        pub calls: Arc<AtomicUsize>,
    }

    impl StaticModel {
        pub fn new(raw: impl Into<String>) -> Self {
            Self {
                raw: raw.into(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelClient for StaticModel {
        fn provider_name(&self) -> &'static str {
            "static_test"
        }

        async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.raw.clone())
        }
    }

    pub struct FailingModel;

    #[async_trait::async_trait]
    impl ModelClient for FailingModel {
        fn provider_name(&self) -> &'static str {
            "failing_test"
        }

        async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            anyhow::bail!("quota exceeded upstream")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = JobEvent::progress(5, "start", "starting manual generation");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "progress");
        assert_eq!(v["percent"], 5);

        let failed = JobEvent::failed("model call failed: quota");
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["type"], "failed");
        assert_eq!(v["percent"], 100);
        assert!(failed.is_terminal());
    }
}
