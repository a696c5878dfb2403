use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured market snapshot for one trading day. The pipeline treats it
/// as opaque beyond serialization and the light validation below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub as_of_date: NaiveDate,
    pub captured_at: DateTime<Utc>,
    pub index_close: f64,
    pub index_pct_change: f64,
    /// Total turnover as the upstream's display string (trillions, e.g. "3.45").
    pub turnover_estimate: String,
    pub leverage_ratio: f64,
    /// Net inflows in hundred-million units; negative means outflow.
    pub main_net_inflow: f64,
    pub retail_net_inflow: f64,
    /// Share of advancing stocks, percent.
    pub win_rate: f64,
    pub sectors: SectorBreakdown,
    /// Fields the pipeline does not interpret; carried through verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorBreakdown {
    pub strong: Vec<SectorHeat>,
    pub weak: Vec<SectorHeat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorHeat {
    pub name: String,
    pub heat: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_expected_shape_and_keeps_unknown_fields() {
        let as_of = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();
        let v = json!({
            "as_of_date": as_of,
            "captured_at": "2026-01-08T07:35:00Z",
            "index_close": 4077.72,
            "index_pct_change": -0.2,
            "turnover_estimate": "3.45",
            "leverage_ratio": 2.53,
            "main_net_inflow": -633.24,
            "retail_net_inflow": 576.26,
            "win_rate": 40.9,
            "sectors": {
                "strong": [{"name": "煤炭行业", "heat": 90.3}],
                "weak": [{"name": "证券", "heat": 9.8}]
            },
            "northbound_net_inflow": -12.4
        });

        let parsed: MarketSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.as_of_date, as_of);
        assert_eq!(parsed.sectors.strong[0].name, "煤炭行业");
        assert!(parsed.extra.contains_key("northbound_net_inflow"));
    }
}
