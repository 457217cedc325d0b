use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::api::retry::{retry_or_else, RetryPolicy};
use crate::api::FinancialDataProvider;
use crate::error::PipelineError;
use crate::database::SymbolStore;

/// Used when the configured source yields nothing
pub const FALLBACK_SYMBOLS: &[&str] = &[
    "MSFT", "AAPL", "GOOGL", "NVDA", "TSLA", "AMZN", "JPM", "V", "MA", "WMT", "JNJ", "XOM", "UNH", "PG", "HD", "DIS",
    "NFLX", "ADBE", "CRM", "INTC", "SBUX", "COST", "CSCO", "PYPL", "ZM", "LUV", "DAL", "UAL", "AAL", "F",
];

/// Always merged into the news-driven universe
pub const LARGE_CAPS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK.B", "JPM", "V", "UNH", "XOM", "JNJ", "WMT", "MA",
    "PG", "AVGO", "HD", "COST", "LLY",
];

pub fn fallback_symbols() -> Vec<String> {
    FALLBACK_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

/// First `target` symbols of the importer's table; empty when unavailable
pub async fn from_table(store: Option<&dyn SymbolStore>, target: usize) -> Vec<String> {
    let Some(store) = store else {
        warn!("⚠️ No symbols table configured");
        return Vec::new();
    };

    match store.fetch_symbols().await {
        Ok(mut symbols) => {
            info!("Successfully fetched {} symbols from the symbols table", symbols.len());
            symbols.truncate(target);
            symbols
        }
        Err(e) => {
            warn!("⚠️ Error fetching symbols: {}", e);
            Vec::new()
        }
    }
}

/// Tickers related to general market news plus the large caps, shuffled.
/// A 429 is returned so the caller can stop before spending more calls.
pub async fn from_news(
    financial: &dyn FinancialDataProvider,
    policy: &RetryPolicy,
    target: usize,
) -> Result<Vec<String>, PipelineError> {
    let related = match retry_or_else(policy, "market news", || financial.market_news_symbols(), Vec::new).await {
        Ok(symbols) => symbols,
        Err(e) if e.is_rate_limited() => return Err(e),
        Err(e) => {
            warn!("⚠️ Market news unavailable: {}", e);
            Vec::new()
        }
    };
    info!("📰 {} related tickers from market news", related.len());

    let mut seen = HashSet::new();
    let mut symbols: Vec<String> = related
        .into_iter()
        .chain(LARGE_CAPS.iter().map(|s| s.to_string()))
        .filter(|s| seen.insert(s.clone()))
        .collect();

    symbols.shuffle(&mut rand::rng());
    symbols.truncate(target);
    Ok(symbols)
}

/// Substitute the fallback list for an empty universe
pub fn or_fallback(symbols: Vec<String>) -> Vec<String> {
    if symbols.is_empty() {
        info!("Using hardcoded list for demonstration.");
        fallback_symbols()
    } else {
        symbols
    }
}
