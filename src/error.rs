use reqwest::StatusCode;
use thiserror::Error;

/// Failures the pipeline distinguishes between when deciding to retry,
/// fall back, stop early or abort.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// HTTP 429 from a metered API. The daily budget is spent.
    #[error("rate limit exhausted for {service}")]
    RateLimited { service: String },

    #[error("request to {url} failed with status {status}")]
    Http { status: StatusCode, url: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("{0} returned no usable data")]
    EmptyResult(String),

    #[error("store operation failed: {0}")]
    Store(String),
}

impl PipelineError {
    pub fn parse(what: impl Into<String>, detail: impl ToString) -> Self {
        PipelineError::Parse {
            what: what.into(),
            detail: detail.to_string(),
        }
    }

    pub fn rate_limited(service: impl Into<String>) -> Self {
        PipelineError::RateLimited {
            service: service.into(),
        }
    }

    /// Retrying a spent budget or a missing credential cannot succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::RateLimited { .. } | PipelineError::MissingConfig(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::RateLimited { .. })
    }
}

/// Looks through an `anyhow` chain for the 429 signal.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<PipelineError>())
        .any(PipelineError::is_rate_limited)
}
