use crate::config::BenchConfig;
use crate::model::Transcript;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Seam to the chat-assistant backend. Implementations must return a
/// completed transcript or fail; the caller applies the per-call
/// timeout.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send_message(&self, assistant_id: &str, question: &str)
        -> anyhow::Result<Transcript>;
    fn provider_name(&self) -> &'static str;
}

/// HTTP client for the chat-in-space API: posts the question into the
/// assistant's space, then polls the message until `completed_at` is
/// stamped.
pub struct SpaceChatClient {
    pub base_url: String,
    pub app_id: String,
    pub api_key: String,
    pub user_id: String,
    pub company_id: String,
    pub poll_interval: Duration,
    client: reqwest::Client,
}

impl SpaceChatClient {
    pub fn new(cfg: &BenchConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            app_id: cfg.app_id.clone(),
            api_key: cfg.api_key.clone(),
            user_id: cfg.user_id.clone(),
            company_id: cfg.company_id.clone(),
            poll_interval: Duration::from_secs(2),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("x-app-id", &self.app_id)
            .header("x-user-id", &self.user_id)
            .header("x-company-id", &self.company_id)
            .header("Content-Type", "application/json")
    }
}

#[async_trait]
impl ChatClient for SpaceChatClient {
    async fn send_message(
        &self,
        assistant_id: &str,
        question: &str,
    ) -> anyhow::Result<Transcript> {
        let url = format!("{}/messages", self.base_url);
        let body = json!({
            "assistant_id": assistant_id,
            "text": question,
            "tool_choices": ["WebSearch"],
        });

        let resp = self.request(self.client.post(&url)).json(&body).send().await?;
        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat API error: {}", error_text);
        }
        let mut transcript: Transcript = resp.json().await?;

        // Poll until the assistant finishes streaming. The caller's
        // timeout bounds this loop.
        let poll_url = format!("{}/messages/{}", self.base_url, transcript.id);
        while transcript.completed_at.is_none() {
            tokio::time::sleep(self.poll_interval).await;
            let resp = self.request(self.client.get(&poll_url)).send().await?;
            if !resp.status().is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                anyhow::bail!("chat API poll error: {}", error_text);
            }
            transcript = resp.json().await?;
        }

        Ok(transcript)
    }

    fn provider_name(&self) -> &'static str {
        "space-chat"
    }
}
