pub mod ark;
pub mod json;
pub mod prompt;

/// Single-turn completion against a generative model. The raw text is the
/// dominant latency source of a generation run; implementations must carry
/// a bounded timeout.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}
