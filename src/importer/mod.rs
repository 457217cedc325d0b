//! Symbol importer: collect tickers from public listings, clean them, and
//! upsert them into the shared symbols table.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::api::{Notifier, RetryPolicy};
use crate::database::{self, SymbolStore};
use crate::models::{Config, ImportStats, ImportStatus, SymbolRecord};

pub mod fetch;
pub mod filter;
pub mod parsers;
pub mod sources;

pub use fetch::SourceFetcher;
pub use filter::{normalize_symbol, SymbolFilter};
pub use sources::{SourceCatalog, SourceCategory, SourceChain, SourceEndpoint, SourceFormat};

/// Rows per upsert request; keeps payloads under the store's size limit
pub const UPSERT_BATCH_SIZE: usize = 500;

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub raw_count: usize,
    pub filtered_count: usize,
    pub symbols: Vec<String>,
    pub failed_sources: Vec<String>,
    pub duration: Duration,
}

pub struct Importer {
    store: Arc<dyn SymbolStore>,
    notifier: Notifier,
    fetcher: SourceFetcher,
    catalog: SourceCatalog,
    filter: SymbolFilter,
    batch_size: usize,
}

fn format_failed(failed: &[String]) -> String {
    if failed.is_empty() {
        "none".to_string()
    } else {
        failed.join(", ")
    }
}

impl Importer {
    pub fn new(
        store: Arc<dyn SymbolStore>,
        notifier: Notifier,
        fetcher: SourceFetcher,
        catalog: SourceCatalog,
        filter: SymbolFilter,
    ) -> Self {
        Self {
            store,
            notifier,
            fetcher,
            catalog,
            filter,
            batch_size: UPSERT_BATCH_SIZE,
        }
    }

    /// Wire up the store, notifier and fetcher named by `config`.
    /// Fails when no backing store is configured.
    pub async fn from_config(config: &Config, catalog: SourceCatalog, exclude_preferred: bool) -> Result<Self> {
        let store = database::connect_symbol_store(config.require_store()?).await?;
        let notifier = Notifier::new(config.slack_webhook_url.clone(), config.sms.clone())?;
        let fetcher = SourceFetcher::new(RetryPolicy::importer())?;
        let filter = SymbolFilter::new(
            config.etf_keywords.clone(),
            config.exclude_preferred || exclude_preferred,
        );
        Ok(Self::new(store, notifier, fetcher, catalog, filter))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run once. Source failures are tolerated; a persistence failure is
    /// recorded, notified and returned.
    pub async fn run(&self) -> Result<ImportReport> {
        let start = Instant::now();
        let mut failed_sources = Vec::new();
        let mut collected = Vec::new();

        for category in &self.catalog.categories {
            let symbols = self.fetcher.fetch_category(category).await;
            if symbols.is_empty() {
                failed_sources.push(category.name.clone());
            }
            collected.extend(symbols);
        }

        let raw_count = collected.len();
        info!("📊 Raw collected: {}", raw_count);

        match self.finish(collected, &failed_sources, start).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.record_failure(raw_count, &failed_sources, start.elapsed(), &e).await;
                Err(e)
            }
        }
    }

    async fn finish(&self, collected: Vec<String>, failed_sources: &[String], start: Instant) -> Result<ImportReport> {
        let raw_count = collected.len();
        let symbols = self.filter.clean(collected);
        let filtered_count = symbols.len();
        info!("🧹 Filtered count: {}", filtered_count);

        self.persist(&symbols).await?;

        self.store
            .insert_import_stats(&ImportStats {
                fetched_count: raw_count,
                filtered_count,
                status: ImportStatus::Success,
                error: None,
            })
            .await?;

        let duration = start.elapsed();
        self.notifier
            .send_slack(&format!(
                "✅ Import successful. Raw: {}  Final: {}  Duration: {:.1}s  Failed sources: {}",
                raw_count,
                filtered_count,
                duration.as_secs_f64(),
                format_failed(failed_sources)
            ))
            .await;

        info!("✅ Import complete in {:.1}s", duration.as_secs_f64());
        Ok(ImportReport {
            raw_count,
            filtered_count,
            symbols,
            failed_sources: failed_sources.to_vec(),
            duration,
        })
    }

    async fn persist(&self, symbols: &[String]) -> Result<()> {
        let total = symbols.len();
        for (i, batch) in symbols.chunks(self.batch_size).enumerate() {
            let rows: Vec<SymbolRecord> = batch.iter().map(SymbolRecord::imported).collect();
            self.store.upsert_symbols(&rows).await?;
            info!(
                "💾 Upserted batch {} ({}/{})",
                i + 1,
                (i * self.batch_size + batch.len()).min(total),
                total
            );
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        raw_count: usize,
        failed_sources: &[String],
        duration: Duration,
        err: &anyhow::Error,
    ) {
        let err_text = format!("{:#}", err);
        error!("❌ Fatal error during import: {}", err_text);

        let stats = ImportStats {
            fetched_count: raw_count,
            filtered_count: 0,
            status: ImportStatus::Failure,
            error: Some(err_text.clone()),
        };
        if let Err(e) = self.store.insert_import_stats(&stats).await {
            warn!("Failed to write import_stats: {}", e);
        }

        let failed = format_failed(failed_sources);
        let secs = duration.as_secs_f64();
        self.notifier
            .send_slack(&format!(
                "❌ Import FAILED: {}\nDuration: {:.1}s\nFailed sources: {}",
                err_text, secs, failed
            ))
            .await;
        self.notifier
            .send_sms(&format!(
                "Import FAILED: {}\nDuration: {:.1}s\nFailed sources: {}",
                err_text, secs, failed
            ))
            .await;
    }
}
