use async_trait::async_trait;
use serde_json::json;

/// Seam to the reference-answer completion model.
#[async_trait]
pub trait GoldenClient: Send + Sync {
    async fn generate(&self, question: &str, model: &str) -> anyhow::Result<String>;
    fn provider_name(&self) -> &'static str;
}

/// OpenAI responses-API client used for golden answers: low reasoning
/// effort, web search enabled.
pub struct OpenAiGoldenClient {
    pub api_key: String,
    pub base_url: String,
    client: reqwest::Client,
}

impl OpenAiGoldenClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GoldenClient for OpenAiGoldenClient {
    async fn generate(&self, question: &str, model: &str) -> anyhow::Result<String> {
        let url = format!("{}/responses", self.base_url);
        let body = json!({
            "model": model,
            "input": question,
            "reasoning": { "effort": "low" },
            "tools": [{ "type": "web_search" }],
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("golden answer API error: {}", error_text);
        }

        let json: serde_json::Value = resp.json().await?;

        // Prefer the flattened convenience field; fall back to the last
        // output item's first content block.
        if let Some(text) = json.get("output_text").and_then(|v| v.as_str()) {
            return Ok(text.to_string());
        }
        let text = json
            .get("output")
            .and_then(|v| v.as_array())
            .and_then(|items| items.last())
            .and_then(|item| item.pointer("/content/0/text"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("golden answer response missing output text"))?;

        Ok(text.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
