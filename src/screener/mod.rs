//! Screener: score a symbol universe and publish the top of the ranking.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{
    ApiRateLimiter, FinancialDataProvider, FinnhubClient, GroqSentimentClient, NewsApiClient, RetryPolicy,
};
use crate::database::{self, DocumentStore, FirestoreRegistry, SymbolStore};
use crate::error::PipelineError;
use crate::models::{Config, ScoredStock, UniverseStrategy};

pub mod metrics;
pub mod publish;
pub mod scoring;
pub mod universe;

pub use metrics::MetricsGatherer;

/// Documents published per run
pub const TOP_N: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenReport {
    pub universe_size: usize,
    pub scored: usize,
    /// Iteration stopped early on a 429
    pub rate_limited: bool,
    pub top: Vec<ScoredStock>,
    pub published: bool,
}

pub struct Screener {
    symbols: Option<Arc<dyn SymbolStore>>,
    documents: Arc<dyn DocumentStore>,
    financial: Arc<dyn FinancialDataProvider>,
    gatherer: MetricsGatherer,
    news_policy: RetryPolicy,
    strategy: UniverseStrategy,
    target: usize,
    collection: String,
}

impl Screener {
    pub fn new(
        symbols: Option<Arc<dyn SymbolStore>>,
        documents: Arc<dyn DocumentStore>,
        financial: Arc<dyn FinancialDataProvider>,
        gatherer: MetricsGatherer,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            symbols,
            documents,
            financial,
            gatherer,
            news_policy: RetryPolicy::finnhub(),
            strategy: UniverseStrategy::Table,
            target: 50,
            collection: collection.into(),
        }
    }

    /// Build every collaborator from `config`. The document store is
    /// mandatory; a missing symbols table only degrades to the fallback list.
    pub async fn from_config(config: &Config, registry: &FirestoreRegistry) -> Result<Self> {
        let documents = database::connect_document_store(config, registry).await?;

        let symbols = match &config.store {
            Some(store) => match database::connect_symbol_store(store).await {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("⚠️ Symbols table unavailable: {}. Falling back to hardcoded symbols.", e);
                    None
                }
            },
            None => {
                warn!("⚠️ Store configuration missing. Falling back to hardcoded symbols.");
                None
            }
        };

        let financial: Arc<dyn FinancialDataProvider> = Arc::new(FinnhubClient::new(
            config.finnhub_base_url.clone(),
            config.finnhub_api_key.clone(),
        )?);
        let headlines = Arc::new(NewsApiClient::new(config.newsapi_base_url.clone(), config.newsapi_key.clone())?);
        let sentiment = Arc::new(GroqSentimentClient::new(
            config.groq_base_url.clone(),
            config.groq_api_key.clone(),
            config.groq_model.clone(),
        )?);

        let gatherer = MetricsGatherer::new(financial.clone(), headlines, sentiment)
            .with_pacing(ApiRateLimiter::from_delay_ms(config.request_delay_ms));

        Ok(Self::new(symbols, documents, financial, gatherer, config.collection_path())
            .with_universe(config.universe, config.target_symbol_count))
    }

    pub fn with_universe(mut self, strategy: UniverseStrategy, target: usize) -> Self {
        self.strategy = strategy;
        self.target = target;
        self
    }

    pub fn with_news_policy(mut self, policy: RetryPolicy) -> Self {
        self.news_policy = policy;
        self
    }

    /// Symbols to score this run. Fails only when the news source answers 429.
    pub async fn select_universe(&self) -> Result<Vec<String>, PipelineError> {
        let symbols = match self.strategy {
            UniverseStrategy::Table => universe::from_table(self.symbols.as_deref(), self.target).await,
            UniverseStrategy::News => {
                universe::from_news(self.financial.as_ref(), &self.news_policy, self.target).await?
            }
        };
        Ok(universe::or_fallback(symbols))
    }

    /// Score `symbols` in order, stopping at the first 429. Returns the
    /// ranked top [`TOP_N`], the number scored, and whether it stopped early.
    pub async fn rank(&self, symbols: &[String]) -> (Vec<ScoredStock>, usize, bool) {
        let mut scored = Vec::new();
        let mut rate_limited = false;

        for (i, symbol) in symbols.iter().enumerate() {
            info!("🔍 [{}/{}] Analyzing {}", i + 1, symbols.len(), symbol);
            match self.gatherer.gather(symbol).await {
                Ok(metrics) => {
                    let score = scoring::composite_score(&metrics, &mut rand::rng());
                    scored.push(ScoredStock {
                        symbol: symbol.clone(),
                        score,
                        pe: metrics.pe,
                        sentiment: metrics.sentiment,
                        volume_surge: metrics.volume_surge_factor,
                        sec_filings_count: metrics.sec_filings_count,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) if e.is_rate_limited() => {
                    warn!("🛑 {} while processing {}; stopping after {} symbols", e, symbol, scored.len());
                    rate_limited = true;
                    break;
                }
                Err(e) => warn!("Skipping {}: {}", symbol, e),
            }
        }

        let count = scored.len();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(TOP_N);
        (scored, count, rate_limited)
    }

    pub async fn run(&self, dry_run: bool) -> Result<ScreenReport> {
        let symbols = match self.select_universe().await {
            Ok(symbols) => symbols,
            Err(e) if e.is_rate_limited() => {
                warn!("🛑 {} while selecting the universe; collection {} left unchanged", e, self.collection);
                return Ok(ScreenReport {
                    universe_size: 0,
                    scored: 0,
                    rate_limited: true,
                    top: Vec::new(),
                    published: false,
                });
            }
            Err(e) => return Err(e.into()),
        };
        info!("Starting analysis on {} candidate stocks...", symbols.len());

        let (top, scored, rate_limited) = self.rank(&symbols).await;
        match top.first() {
            Some(best) => info!("🏆 Top {} stocks identified. Highest score: {:.3}", top.len(), best.score),
            None => warn!("⚠️ No stocks were scored"),
        }

        let published = if dry_run {
            for (i, stock) in top.iter().enumerate() {
                info!("{:>2}. {:<8} {:.3}", i + 1, stock.symbol, stock.score);
            }
            info!("Dry run; collection {} left unchanged", self.collection);
            false
        } else if top.is_empty() {
            warn!("⚠️ Nothing to publish; collection {} left unchanged", self.collection);
            false
        } else {
            publish::replace_collection(self.documents.as_ref(), &self.collection, &top).await?;
            true
        };

        Ok(ScreenReport {
            universe_size: symbols.len(),
            scored,
            rate_limited,
            top,
            published,
        })
    }
}
