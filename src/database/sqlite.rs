use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use super::{DocumentStore, SymbolStore};
use crate::models::{ImportStats, ScoredStock, SymbolRecord};

/// Local SQLite stand-in for both the symbols tables and the published
/// document collection
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url`
    pub async fn new(database_url: &str) -> Result<Self> {
        let connection_string = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite:{}", database_url)
        };
        let in_memory = connection_string.contains(":memory:");

        let options = SqliteConnectOptions::from_str(&connection_string)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            // every connection to :memory: is a separate database
            .max_connections(if in_memory { 1 } else { 5 })
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Database initialized at {}", connection_string);
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS symbols (
                symbol TEXT PRIMARY KEY NOT NULL,
                is_valid BOOLEAN,
                source TEXT NOT NULL,
                last_checked DATETIME
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS import_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fetched_count INTEGER NOT NULL,
                filtered_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent importer runs, newest first
    pub async fn recent_import_stats(&self, limit: i64) -> Result<Vec<ImportStats>> {
        let rows = sqlx::query(
            "SELECT fetched_count, filtered_count, status, error FROM import_stats ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(ImportStats {
                    fetched_count: row.get::<i64, _>("fetched_count") as usize,
                    filtered_count: row.get::<i64, _>("filtered_count") as usize,
                    status: serde_json::from_value(serde_json::Value::String(status))?,
                    error: row.get("error"),
                })
            })
            .collect()
    }

    /// Read back one published document
    pub async fn get_document(&self, collection: &str, id: &str) -> Result<Option<ScoredStock>> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get("body");
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SymbolStore for SqliteStore {
    async fn upsert_symbols(&self, rows: &[SymbolRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in rows {
            sqlx::query(
                r#"
                INSERT INTO symbols (symbol, is_valid, source, last_checked)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(symbol) DO UPDATE SET
                    is_valid = excluded.is_valid,
                    source = excluded.source,
                    last_checked = excluded.last_checked
                "#,
            )
            .bind(&record.symbol)
            .bind(record.is_valid)
            .bind(&record.source)
            .bind(record.last_checked)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_import_stats(&self, stats: &ImportStats) -> Result<()> {
        sqlx::query(
            "INSERT INTO import_stats (fetched_count, filtered_count, status, error) VALUES (?, ?, ?, ?)",
        )
        .bind(stats.fetched_count as i64)
        .bind(stats.filtered_count as i64)
        .bind(stats.status.as_str())
        .bind(&stats.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_symbols(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT symbol FROM symbols ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("symbol")).collect())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM documents WHERE collection = ? ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("id")).collect())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_document(&self, collection: &str, id: &str, stock: &ScoredStock) -> Result<()> {
        let body = serde_json::to_string(stock)?;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, updated_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::models::ImportStatus;

    #[tokio::test]
    async fn test_upsert_replaces_existing_symbol() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();

        store
            .upsert_symbols(&[SymbolRecord::imported("AAPL"), SymbolRecord::imported("MSFT")])
            .await
            .unwrap();

        let mut refreshed = SymbolRecord::imported("AAPL");
        refreshed.source = "manual".to_string();
        store.upsert_symbols(&[refreshed]).await.unwrap();

        assert_eq!(store.fetch_symbols().await.unwrap(), vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn test_import_stats_are_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.db");
        let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();

        store
            .insert_import_stats(&ImportStats {
                fetched_count: 3,
                filtered_count: 1,
                status: ImportStatus::Success,
                error: None,
            })
            .await
            .unwrap();
        store
            .insert_import_stats(&ImportStats {
                fetched_count: 0,
                filtered_count: 0,
                status: ImportStatus::Failure,
                error: Some("boom".to_string()),
            })
            .await
            .unwrap();

        let stats = store.recent_import_stats(10).await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].status, ImportStatus::Failure);
        assert_eq!(stats[0].error.as_deref(), Some("boom"));
        assert_eq!(stats[1].fetched_count, 3);
    }

    #[tokio::test]
    async fn test_documents_scoped_by_collection() {
        let store = SqliteStore::new("sqlite::memory:").await.unwrap();
        let stock = ScoredStock {
            symbol: "NVDA".to_string(),
            score: 8.123,
            pe: 45.0,
            sentiment: 0.8,
            volume_surge: 3.1,
            sec_filings_count: 2,
            timestamp: Utc::now(),
        };

        store.set_document("a/topStocks", "NVDA", &stock).await.unwrap();
        store.set_document("b/topStocks", "NVDA", &stock).await.unwrap();
        store.delete_document("a/topStocks", "NVDA").await.unwrap();

        assert!(store.list_document_ids("a/topStocks").await.unwrap().is_empty());
        assert_eq!(store.list_document_ids("b/topStocks").await.unwrap(), vec!["NVDA"]);
        assert_eq!(
            store.get_document("b/topStocks", "NVDA").await.unwrap().map(|s| s.score),
            Some(8.123)
        );
    }
}
