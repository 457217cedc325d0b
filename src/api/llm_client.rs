use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::http_client;
use crate::error::PipelineError;

const SYSTEM_PROMPT: &str = "You are a concise financial sentiment analyzer. Your task is to analyze the provided text, \
which consists of recent news headlines for a stock, and output a JSON object only. \
The JSON must contain a single key, 'sentiment_score', with a float value between 0.0 (extremely negative) and 1.0 (extremely positive). \
Do not include any other text, explanations, or markdown.";

/// Scores a batch of headlines into `[0, 1]`
#[async_trait]
pub trait SentimentModel: Send + Sync {
    async fn sentiment(&self, symbol: &str, headlines: &[String]) -> Result<f64, PipelineError>;

    /// `false` when no credentials are configured and callers should mock
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentimentPayload {
    sentiment_score: f64,
}

/// Groq's OpenAI-compatible chat-completions endpoint in JSON mode
pub struct GroqSentimentClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl GroqSentimentClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(Duration::from_secs(20), "ticker-pipeline/1.0")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }
}

/// Pull the score out of the model's JSON content and clamp it
pub fn parse_sentiment_content(content: &str) -> Result<f64, PipelineError> {
    let payload: SentimentPayload = serde_json::from_str(content.trim())
        .map_err(|e| PipelineError::parse("sentiment JSON", e))?;
    if !payload.sentiment_score.is_finite() {
        return Err(PipelineError::parse("sentiment JSON", "score is not a finite number"));
    }
    Ok(payload.sentiment_score.clamp(0.0, 1.0))
}

#[async_trait]
impl SentimentModel for GroqSentimentClient {
    async fn sentiment(&self, symbol: &str, headlines: &[String]) -> Result<f64, PipelineError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfig("GROQ_API_KEY".to_string()))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!(
                        "Analyze the overall financial sentiment for {} based on the following headlines:\n\n---\n{}",
                        symbol,
                        headlines.join("\n")
                    ),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&request)
            .send()
            .await?;

        // Groq's per-minute limit clears quickly, so a 429 here stays retryable
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Http { status, url });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::parse("chat completion", e))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::EmptyResult("chat completion".to_string()))?;

        let score = parse_sentiment_content(&content)?;
        debug!("LLM sentiment for {}: {:.3}", symbol, score);
        Ok(score)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
