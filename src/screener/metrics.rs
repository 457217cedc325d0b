use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

use super::scoring::round_to;
use crate::api::retry::{retry_or_else, RetryPolicy};
use crate::api::{ApiRateLimiter, FinancialDataProvider, HeadlineSource, SentimentModel};
use crate::error::PipelineError;
use crate::models::StockMetrics;

/// Trailing window for counted SEC filings
pub const FILINGS_WINDOW_DAYS: i64 = 90;

/// Sentiment when no model is configured
pub fn mock_sentiment() -> f64 {
    rand::rng().random_range(0.4..=0.95)
}

/// Sentiment when there is nothing to score or the model kept failing
pub fn neutral_sentiment() -> f64 {
    rand::rng().random_range(0.4..=0.6)
}

pub fn mock_pe() -> f64 {
    round_to(rand::rng().random_range(15.0..=80.0), 1)
}

/// Placeholder until volume surge is computed from price history
pub fn mock_volume_surge() -> f64 {
    round_to(rand::rng().random_range(1.0..=5.0), 1)
}

/// Keep the rate-limit signal, replace everything else with `fallback`
fn settle<T>(result: Result<T, PipelineError>, label: &str, fallback: impl FnOnce() -> T) -> Result<T, PipelineError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_rate_limited() => Err(e),
        Err(e) => {
            debug!("{} unavailable ({}); using fallback", label, e);
            Ok(fallback())
        }
    }
}

/// Collects the four per-symbol inputs to the composite score.
///
/// Each call is retried per its policy and falls back to a mock value. Only a
/// 429 from the financial or news API is returned as an error.
pub struct MetricsGatherer {
    financial: Arc<dyn FinancialDataProvider>,
    headlines: Arc<dyn HeadlineSource>,
    sentiment: Arc<dyn SentimentModel>,
    finnhub_policy: RetryPolicy,
    llm_policy: RetryPolicy,
    pacing: ApiRateLimiter,
}

impl MetricsGatherer {
    pub fn new(
        financial: Arc<dyn FinancialDataProvider>,
        headlines: Arc<dyn HeadlineSource>,
        sentiment: Arc<dyn SentimentModel>,
    ) -> Self {
        Self {
            financial,
            headlines,
            sentiment,
            finnhub_policy: RetryPolicy::finnhub(),
            llm_policy: RetryPolicy::llm(),
            pacing: ApiRateLimiter::from_delay_ms(1000),
        }
    }

    pub fn with_policies(mut self, finnhub: RetryPolicy, llm: RetryPolicy) -> Self {
        self.finnhub_policy = finnhub;
        self.llm_policy = llm;
        self
    }

    pub fn with_pacing(mut self, pacing: ApiRateLimiter) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn gather(&self, symbol: &str) -> Result<StockMetrics, PipelineError> {
        let sentiment = self.sentiment_for(symbol).await?;
        self.pacing.wait().await;

        let pe = self.pe_for(symbol).await?;
        self.pacing.wait().await;

        let sec_filings_count = self.filings_for(symbol).await?;
        self.pacing.wait().await;

        Ok(StockMetrics {
            pe,
            sentiment,
            volume_surge_factor: mock_volume_surge(),
            sec_filings_count,
        })
    }

    async fn sentiment_for(&self, symbol: &str) -> Result<f64, PipelineError> {
        if !self.sentiment.is_configured() {
            debug!("No LLM configured. Using mock sentiment for {}", symbol);
            return Ok(mock_sentiment());
        }

        let label = format!("NewsAPI {}", symbol);
        let result = retry_or_else(
            &self.llm_policy,
            &label,
            || self.headlines.headlines(symbol),
            Vec::new,
        )
        .await;
        let headlines = settle(result, &label, Vec::new)?;

        if headlines.is_empty() {
            debug!("No recent news for {}", symbol);
            return Ok(neutral_sentiment());
        }

        let label = format!("LLM sentiment {}", symbol);
        let result = retry_or_else(
            &self.llm_policy,
            &label,
            || self.sentiment.sentiment(symbol, &headlines),
            neutral_sentiment,
        )
        .await;
        settle(result, &label, neutral_sentiment)
    }

    async fn pe_for(&self, symbol: &str) -> Result<f64, PipelineError> {
        let label = format!("P/E {}", symbol);
        let result = retry_or_else(&self.finnhub_policy, &label, || self.financial.pe_ratio(symbol), || None).await;

        match settle(result, &label, || None)? {
            Some(pe) if pe != 0.0 && pe.is_finite() => {
                info!("💹 Fetched P/E for {}: {:.1}", symbol, pe);
                Ok(pe)
            }
            _ => Ok(mock_pe()),
        }
    }

    async fn filings_for(&self, symbol: &str) -> Result<u32, PipelineError> {
        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(FILINGS_WINDOW_DAYS);

        let label = format!("SEC filings {}", symbol);
        let result = retry_or_else(
            &self.finnhub_policy,
            &label,
            || self.financial.sec_filing_count(symbol, from, to),
            || 0,
        )
        .await;
        let count = settle(result, &label, || 0)?;
        debug!("Found {} recent SEC filings for {}", count, symbol);
        Ok(count)
    }
}
