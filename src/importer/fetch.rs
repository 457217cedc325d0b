use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::parsers;
use super::sources::{SourceCategory, SourceChain, SourceEndpoint};
use crate::api::retry::{retry, RetryPolicy};
use crate::api::{check_status, http_client, BROWSER_USER_AGENT};
use crate::error::PipelineError;

const SOURCE_TIMEOUT: Duration = Duration::from_secs(20);

/// Downloads and parses symbol sources, walking each fallback chain
pub struct SourceFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl SourceFetcher {
    pub fn new(policy: RetryPolicy) -> Result<Self, PipelineError> {
        Self::with_timeout(policy, SOURCE_TIMEOUT)
    }

    pub fn with_timeout(policy: RetryPolicy, timeout: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(timeout, BROWSER_USER_AGENT)?,
            policy,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, PipelineError> {
        let response = self.client.get(url).send().await?;
        let response = check_status(response, url)?;
        Ok(response.text().await?)
    }

    /// One endpoint with retries. An empty parse counts as a failed attempt.
    pub async fn fetch_endpoint(&self, endpoint: &SourceEndpoint) -> Result<Vec<String>, PipelineError> {
        retry(&self.policy, &format!("GET {}", endpoint.url), || async {
            let body = self.get_text(&endpoint.url).await?;
            let symbols = parsers::parse(&endpoint.format, &body)?;
            if symbols.is_empty() {
                return Err(PipelineError::EmptyResult(endpoint.url.clone()));
            }
            Ok(symbols)
        })
        .await
    }

    /// Symbols from the first endpoint in the chain that works, or nothing
    pub async fn fetch_first_working(&self, chain: &SourceChain) -> Vec<String> {
        for endpoint in &chain.endpoints {
            match self.fetch_endpoint(endpoint).await {
                Ok(symbols) => {
                    debug!("{}: {} symbols from {}", chain.label, symbols.len(), endpoint.url);
                    return symbols;
                }
                Err(e) if e.is_rate_limited() => {
                    warn!("⏳ {} rate limited; trying next mirror", endpoint.url);
                }
                Err(e) => {
                    warn!("All attempts failed for {}: {}", endpoint.url, e);
                }
            }
        }
        warn!("No source in chain {} produced symbols", chain.label);
        Vec::new()
    }

    /// Concatenated results of every chain in the category
    pub async fn fetch_category(&self, category: &SourceCategory) -> Vec<String> {
        info!("📥 Fetching {}...", category.name);
        let mut symbols = Vec::new();
        for chain in &category.chains {
            symbols.extend(self.fetch_first_working(chain).await);
        }
        info!("📊 {}: {} raw symbols", category.name, symbols.len());
        symbols
    }
}
