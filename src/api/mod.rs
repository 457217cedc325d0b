use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::error::PipelineError;

pub mod finnhub_client;
pub mod llm_client;
pub mod news_client;
pub mod notifications;
pub mod retry;

pub use finnhub_client::{FinancialDataProvider, FinnhubClient};
pub use llm_client::{GroqSentimentClient, SentimentModel};
pub use news_client::{HeadlineSource, NewsApiClient};
pub use notifications::Notifier;
pub use retry::{Backoff, RetryPolicy};

/// Browser User-Agent; the public list mirrors block default client strings
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Build a client with a fixed per-request timeout
pub fn http_client(timeout: Duration, user_agent: &str) -> Result<Client, PipelineError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?)
}

/// Map a response status onto the pipeline's error taxonomy.
///
/// 429 becomes [`PipelineError::RateLimited`] tagged with `service` so callers
/// can stop instead of retrying.
pub fn check_status(response: Response, service: &str) -> Result<Response, PipelineError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PipelineError::rate_limited(service));
    }
    if !status.is_success() {
        return Err(PipelineError::Http {
            status,
            url: response.url().to_string(),
        });
    }
    debug!("{} responded {}", service, status);
    Ok(response)
}

/// Fixed delay between outbound requests to stay under third-party limits
#[derive(Debug, Clone, Copy)]
pub struct ApiRateLimiter {
    delay_ms: u64,
}

impl ApiRateLimiter {
    pub fn from_delay_ms(delay_ms: u64) -> Self {
        Self { delay_ms }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub async fn wait(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(self.delay()).await;
        }
    }
}
