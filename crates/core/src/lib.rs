pub mod configstore;
pub mod domain;
pub mod error;
pub mod llm;
pub mod market;
pub mod pipeline;
pub mod sched;
pub mod store;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub app_env: String,
        pub data_dir: PathBuf,
        pub config_dir: PathBuf,
        pub market_data_base_url: Option<String>,
        pub market_data_api_key: Option<String>,
        pub model_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub debug_capture: bool,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string()),
                data_dir: std::env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("data")),
                config_dir: std::env::var("CONFIG_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("config")),
                market_data_base_url: std::env::var("MARKET_DATA_BASE_URL").ok(),
                market_data_api_key: std::env::var("MARKET_DATA_API_KEY").ok(),
                model_api_key: std::env::var("MODEL_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                debug_capture: std::env::var("REPORT_DEBUG").as_deref() == Ok("1"),
            })
        }

        pub fn require_market_data_base_url(&self) -> anyhow::Result<&str> {
            self.market_data_base_url
                .as_deref()
                .context("MARKET_DATA_BASE_URL is required")
        }

        pub fn require_model_api_key(&self) -> anyhow::Result<&str> {
            self.model_api_key
                .as_deref()
                .context("MODEL_API_KEY is required")
        }
    }
}
