//! OpenAI-compatible chat client for portfolio commentary
//!
//! The comparison payload is serialized and handed to a language model; the
//! model's prose comes back verbatim. Nothing here touches the core pipeline;
//! the HTTP layer calls this after `compare`.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o";

const SYSTEM_PROMPT: &str = "You are an expert financial analyst specializing in \
trading strategy evaluation and risk management. Provide detailed, actionable insights.";

/// Chat-completion client for preset analysis commentary
#[derive(Clone)]
pub struct AnalysisClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl AnalysisClient {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    /// Build the client from `OPENAI_API_KEY` / `OPENAI_BASE_URL` /
    /// `OPENAI_MODEL`. Returns `None` when no key is configured so the
    /// caller can disable the analysis endpoint instead of failing startup.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        Some(Self::new(
            api_key,
            std::env::var("OPENAI_BASE_URL").ok(),
            std::env::var("OPENAI_MODEL").ok(),
        ))
    }

    /// Send a structured comparison payload and return the model's prose.
    pub async fn analyze(&self, payload: &serde_json::Value) -> Result<String> {
        let prompt = build_prompt(payload)?;
        debug!(model = %self.model, prompt_chars = prompt.len(), "requesting analysis");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.7,
            max_tokens: 2000,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("analysis request failed")?
            .error_for_status()
            .context("analysis request rejected")?;

        let body: ChatResponse = response
            .json()
            .await
            .context("invalid analysis response")?;

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("analysis response contained no choices")?;

        info!(chars = content.len(), "analysis received");
        Ok(content)
    }
}

fn build_prompt(payload: &serde_json::Value) -> Result<String> {
    let data = serde_json::to_string_pretty(payload).context("unserializable payload")?;
    Ok(format!(
        "Analyze the following MT5 preset comparison data:\n\n{data}\n\n\
Please provide:\n\
1. An overall assessment of the compared parameter sets\n\
2. Which preset should be prioritized and why\n\
3. Risk analysis: drawdown levels and robustness of each preset\n\
4. Three to five specific, actionable recommendations\n\n\
Format your response in a clear, structured manner suitable for display in a dashboard."
    ))
}
