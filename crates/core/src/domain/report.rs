use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::market::types::MarketSnapshot;

/// Which trigger slot produced a document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    PreMarket,
    Midday,
    PostMarket,
    Manual,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreMarket => "pre_market",
            Self::Midday => "midday",
            Self::PostMarket => "post_market",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pre_market" => Ok(Self::PreMarket),
            "midday" => Ok(Self::Midday),
            "post_market" => Ok(Self::PostMarket),
            "manual" => Ok(Self::Manual),
            other => anyhow::bail!(
                "unknown run mode {other:?} (expected pre_market|midday|post_market|manual)"
            ),
        }
    }

    /// Map a scheduled fire time (market-local) to the slot it produces.
    pub fn for_slot(time: NaiveTime) -> Self {
        match time.hour() {
            h if h < 12 => Self::PreMarket,
            h if h < 15 => Self::Midday,
            _ => Self::PostMarket,
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    /// In [0, 1]. Stored exactly as the model produced it; scenario
    /// probabilities are never normalized to sum to 1.
    pub probability: f64,
    pub narrative: String,
}

/// The unit of persistence: one document per calendar date. A new
/// successful generation for the same date replaces the prior version
/// atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDocument {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub run_mode: RunMode,
    pub market_snapshot: MarketSnapshot,
    pub scenarios: Vec<Scenario>,
    /// The model's full free-form report text, kept verbatim for
    /// audit/debug display.
    pub narrative_raw: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_round_trips_through_parse() {
        for mode in [
            RunMode::PreMarket,
            RunMode::Midday,
            RunMode::PostMarket,
            RunMode::Manual,
        ] {
            assert_eq!(RunMode::parse(mode.as_str()).unwrap(), mode);
        }
        assert!(RunMode::parse("overnight").is_err());
    }

    #[test]
    fn slot_mapping_covers_default_schedule() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(RunMode::for_slot(t(9, 25)), RunMode::PreMarket);
        assert_eq!(RunMode::for_slot(t(12, 30)), RunMode::Midday);
        assert_eq!(RunMode::for_slot(t(15, 10)), RunMode::PostMarket);
    }
}
