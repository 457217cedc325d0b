use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::{Config, DocumentStoreConfig, ImportStats, ScoredStock, StoreConfig, SymbolRecord};

pub mod firestore;
pub mod sqlite;
pub mod supabase;

pub use firestore::{FirestoreClient, FirestoreRegistry};
pub use sqlite::SqliteStore;
pub use supabase::SupabaseClient;

/// Table holding the importer's output
pub const SYMBOLS_TABLE: &str = "symbols";

/// Append-only importer run log
pub const IMPORT_STATS_TABLE: &str = "import_stats";

/// The relational tables shared between importer and screener
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SymbolStore: Send + Sync {
    /// Insert-or-replace keyed on `symbol`
    async fn upsert_symbols(&self, rows: &[SymbolRecord]) -> Result<()>;

    async fn insert_import_stats(&self, stats: &ImportStats) -> Result<()>;

    /// Every symbol currently in the table
    async fn fetch_symbols(&self) -> Result<Vec<String>>;
}

/// Collection-of-documents store the front-end reads from
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    async fn set_document(&self, collection: &str, id: &str, stock: &ScoredStock) -> Result<()>;
}

/// Open the relational store named by the configuration
pub async fn connect_symbol_store(config: &StoreConfig) -> Result<Arc<dyn SymbolStore>> {
    match config {
        StoreConfig::Supabase { url, key } => Ok(Arc::new(SupabaseClient::new(url, key)?)),
        StoreConfig::Sqlite { path } => Ok(Arc::new(SqliteStore::new(path).await?)),
    }
}

/// Open the document store named by the configuration.
///
/// Firestore clients come from `registry`, so repeated calls for the same
/// app reuse one authenticated client.
pub async fn connect_document_store(
    config: &Config,
    registry: &FirestoreRegistry,
) -> Result<Arc<dyn DocumentStore>> {
    let app_name = format!("screener_app_{}", config.app_id);
    match config.require_document_store()? {
        DocumentStoreConfig::Firestore { service_account_json } => {
            let client: Arc<dyn DocumentStore> = registry
                .get_or_create(&app_name, || FirestoreClient::from_service_account_json(&service_account_json))
                .await?;
            Ok(client)
        }
        DocumentStoreConfig::FirestoreEmulator { host, project_id } => {
            let client: Arc<dyn DocumentStore> = registry
                .get_or_create(&app_name, || FirestoreClient::emulator(&host, &project_id))
                .await?;
            Ok(client)
        }
        DocumentStoreConfig::Sqlite { path } => Ok(Arc::new(SqliteStore::new(&path).await?)),
    }
}
