use crate::config::Settings;
use crate::error::ReportError;
use crate::llm::ModelClient;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const DEFAULT_MODEL: &str = "deepseek-v3-2-251201";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client for an OpenAI-style chat-completions endpoint (Volces Ark).
#[derive(Debug, Clone)]
pub struct ArkClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ArkClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_model_api_key()?.to_string();
        let base_url =
            std::env::var("MODEL_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout_secs = std::env::var("MODEL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build model http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl ModelClient for ArkClient {
    fn provider_name(&self) -> &'static str {
        "volces_ark"
    }

    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            stream: false,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user.to_string(),
                },
            ],
        };

        let res = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| ReportError::ModelError(format!("model request failed: {e}")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| ReportError::ModelError(format!("failed to read model response: {e}")))?;

        if !status.is_success() {
            // Quota and auth failures land here with the upstream body attached.
            return Err(ReportError::ModelError(format!("model HTTP {status}: {text}")).into());
        }

        let parsed = serde_json::from_str::<ChatResponse>(&text).map_err(|e| {
            ReportError::ModelError(format!("failed to decode model response: {e}: {text}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ReportError::ModelError("model response contained no choices".into()))?;

        Ok(content)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    stream: bool,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_chat_completion_response() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "{\"narrative\": \"x\"}"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"narrative\": \"x\"}");
    }
}
