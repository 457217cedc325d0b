use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{SymbolStore, IMPORT_STATS_TABLE, SYMBOLS_TABLE};
use crate::api::http_client;
use crate::error::PipelineError;
use crate::models::{ImportStats, SymbolRecord};

/// PostgREST caps unpaged selects at 1000 rows by default
const SELECT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct SymbolRow {
    symbol: Option<String>,
}

/// Supabase tables over the PostgREST HTTP interface
pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    key: String,
}

impl SupabaseClient {
    pub fn new(url: &str, key: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30), "ticker-pipeline/1.0")?,
            rest_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            key: key.to_string(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn ensure_success(response: Response, table: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::Store(format!("{} returned {}: {}", table, status, body)).into())
    }
}

#[async_trait]
impl SymbolStore for SupabaseClient {
    async fn upsert_symbols(&self, rows: &[SymbolRecord]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .request(Method::POST, SYMBOLS_TABLE)
            .query(&[("on_conflict", "symbol")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;
        Self::ensure_success(response, SYMBOLS_TABLE).await?;

        debug!("Upserted {} rows into {}", rows.len(), SYMBOLS_TABLE);
        Ok(())
    }

    async fn insert_import_stats(&self, stats: &ImportStats) -> Result<()> {
        let response = self
            .request(Method::POST, IMPORT_STATS_TABLE)
            .header("Prefer", "return=minimal")
            .json(stats)
            .send()
            .await?;
        Self::ensure_success(response, IMPORT_STATS_TABLE).await?;
        Ok(())
    }

    async fn fetch_symbols(&self) -> Result<Vec<String>> {
        let mut symbols = Vec::new();
        let mut offset = 0usize;

        loop {
            let response = self
                .request(Method::GET, SYMBOLS_TABLE)
                .query(&[
                    ("select", "symbol".to_string()),
                    ("order", "symbol.asc".to_string()),
                    ("limit", SELECT_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ])
                .send()
                .await?;
            let response = Self::ensure_success(response, SYMBOLS_TABLE).await?;

            let page: Vec<SymbolRow> = response.json().await?;
            let page_len = page.len();
            symbols.extend(page.into_iter().filter_map(|r| r.symbol).filter(|s| !s.is_empty()));

            if page_len < SELECT_PAGE_SIZE {
                break;
            }
            offset += page_len;
        }

        Ok(symbols)
    }
}
