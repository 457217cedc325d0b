use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{check_status, http_client};
use crate::error::PipelineError;

const SERVICE: &str = "newsapi";

/// Recent headlines for a ticker
#[async_trait]
pub trait HeadlineSource: Send + Sync {
    async fn headlines(&self, symbol: &str) -> Result<Vec<String>, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
}

/// NewsAPI `/v2/everything` client
pub struct NewsApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    page_size: u32,
}

impl NewsApiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(Duration::from_secs(10), "ticker-pipeline/1.0")?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            page_size: 10,
        })
    }
}

#[async_trait]
impl HeadlineSource for NewsApiClient {
    async fn headlines(&self, symbol: &str) -> Result<Vec<String>, PipelineError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfig("NEWSAPI_KEY".to_string()))?;

        let url = format!("{}/v2/everything", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", format!("{} stock", symbol)),
                ("sortBy", "publishedAt".to_string()),
                ("language", "en".to_string()),
                ("pageSize", self.page_size.to_string()),
                ("apiKey", key.to_string()),
            ])
            .send()
            .await?;
        let response = check_status(response, SERVICE)?;

        let body: EverythingResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::parse("newsapi articles", e))?;

        let headlines: Vec<String> = body
            .articles
            .into_iter()
            .filter_map(|a| a.title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        debug!("{} headlines for {}", headlines.len(), symbol);
        Ok(headlines)
    }
}
