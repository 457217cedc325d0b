use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::{check_status, http_client};
use crate::error::PipelineError;

const SERVICE: &str = "finnhub";

/// Filing forms counted toward the SEC sub-score
pub const COUNTED_FORMS: &[&str] = &["10-K", "10-Q"];

/// Single-attempt access to the financial data API. Retries and mock
/// fallbacks are layered on by the caller.
#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Trailing-twelve-month P/E, `None` when the API has no value
    async fn pe_ratio(&self, symbol: &str) -> Result<Option<f64>, PipelineError>;

    /// Number of 10-K/10-Q filings dated within `[from, to]`
    async fn sec_filing_count(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<u32, PipelineError>;

    /// Tickers mentioned in the `related` field of general market news
    async fn market_news_symbols(&self) -> Result<Vec<String>, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    metric: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Filing {
    #[serde(default)]
    form: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FilingsResponse {
    List(Vec<Filing>),
    Wrapped { filings: Vec<Filing> },
}

#[derive(Debug, Deserialize)]
struct NewsArticle {
    #[serde(default)]
    related: String,
}

/// Finnhub REST client
pub struct FinnhubClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FinnhubClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, PipelineError> {
        let client = http_client(Duration::from_secs(15), "ticker-pipeline/1.0")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, PipelineError> {
        let token = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfig("FINANCIAL_API_KEY".to_string()))?;

        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Making request to: {}", url);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("token", token)])
            .send()
            .await?;
        let response = check_status(response, SERVICE)?;

        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::parse(format!("finnhub {}", endpoint), e))
    }
}

#[async_trait]
impl FinancialDataProvider for FinnhubClient {
    async fn pe_ratio(&self, symbol: &str) -> Result<Option<f64>, PipelineError> {
        let data: MetricResponse = self
            .get_json(
                "/stock/metric",
                &[("symbol", symbol.to_string()), ("metric", "all".to_string())],
            )
            .await?;

        Ok(data
            .metric
            .as_ref()
            .and_then(|m| m.get("peTTM"))
            .and_then(Value::as_f64))
    }

    async fn sec_filing_count(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<u32, PipelineError> {
        let data: FilingsResponse = self
            .get_json(
                "/stock/filings",
                &[
                    ("symbol", symbol.to_string()),
                    ("from", from.format("%Y-%m-%d").to_string()),
                    ("to", to.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;

        let filings = match data {
            FilingsResponse::List(filings) => filings,
            FilingsResponse::Wrapped { filings } => filings,
        };

        let count = filings
            .iter()
            .filter(|f| {
                let form = f.form.trim().to_uppercase();
                COUNTED_FORMS.contains(&form.as_str())
            })
            .count();

        Ok(count as u32)
    }

    async fn market_news_symbols(&self) -> Result<Vec<String>, PipelineError> {
        let articles: Vec<NewsArticle> = self
            .get_json("/news", &[("category", "general".to_string())])
            .await?;

        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        for article in &articles {
            for raw in article.related.split(',') {
                let symbol = raw.trim().to_uppercase();
                if !symbol.is_empty() && seen.insert(symbol.clone()) {
                    symbols.push(symbol);
                }
            }
        }

        debug!("Collected {} related tickers from {} articles", symbols.len(), articles.len());
        Ok(symbols)
    }
}
