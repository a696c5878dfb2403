use crate::config::Settings;
use crate::market::types::MarketSnapshot;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/market_snapshot";
const DEFAULT_RETRIES: u32 = 3;

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_snapshot(&self, date: NaiveDate) -> Result<MarketSnapshot>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonMarketData {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonMarketData {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_market_data_base_url()?.to_string();
        let api_key = settings.market_data_api_key.clone();

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let path = std::env::var("MARKET_DATA_SNAPSHOT_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, date: NaiveDate) -> Result<MarketSnapshot> {
        let url = self.url();
        let headers = self.headers()?;

        let res = self
            .http
            .get(url)
            .headers(headers)
            .query(&[("date", date.to_string())])
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;

        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<MarketSnapshot>(&text)
            .with_context(|| format!("market data response is not a valid snapshot: {text}"))?;
        Ok(parsed)
    }

    fn validate(&self, snapshot: &MarketSnapshot, expected: NaiveDate) -> Result<()> {
        anyhow::ensure!(
            snapshot.as_of_date == expected,
            "snapshot as_of_date mismatch: expected {expected}, got {}",
            snapshot.as_of_date
        );

        for sector in snapshot
            .sectors
            .strong
            .iter()
            .chain(snapshot.sectors.weak.iter())
        {
            anyhow::ensure!(
                !sector.name.trim().is_empty(),
                "sector name must be non-empty"
            );
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketDataClient for HttpJsonMarketData {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_snapshot(&self, date: NaiveDate) -> Result<MarketSnapshot> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(date).await {
                Ok(snapshot) => {
                    self.validate(&snapshot, date)?;
                    return Ok(snapshot);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::{SectorBreakdown, SectorHeat};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn snapshot(as_of_date: NaiveDate) -> MarketSnapshot {
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
                strong: vec![SectorHeat {
                    name: "煤炭行业".to_string(),
                    heat: 90.3,
                }],
                weak: vec![],
            },
            extra: BTreeMap::new(),
        }
    }

    fn provider() -> HttpJsonMarketData {
        HttpJsonMarketData {
            http: reqwest::Client::new(),
            base_url: "http://localhost".to_string(),
            api_key: None,
            path: DEFAULT_PATH.to_string(),
            retries: 1,
        }
    }

    #[test]
    fn validate_rejects_date_mismatch() {
        let expected = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();
        let other = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        assert!(provider().validate(&snapshot(other), expected).is_err());
        assert!(provider().validate(&snapshot(expected), expected).is_ok());
    }

    #[test]
    fn validate_rejects_blank_sector_name() {
        let expected = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();
        let mut s = snapshot(expected);
        s.sectors.weak.push(SectorHeat {
            name: "  ".to_string(),
            heat: 1.0,
        });
        assert!(provider().validate(&s, expected).is_err());
    }
}
