use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use test_log::test;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ticker_pipeline::api::{ApiRateLimiter, FinancialDataProvider, FinnhubClient, GroqSentimentClient, NewsApiClient};
use ticker_pipeline::database::{DocumentStore, SymbolStore};
use ticker_pipeline::models::{SymbolRecord, UniverseStrategy};
use ticker_pipeline::screener::{MetricsGatherer, Screener};

use crate::common::{fresh_store, logging, policies};

const COLLECTION: &str = "artifacts/test-app/public/data/topStocks";

async fn finnhub_with_limit_on(server: &MockServer, limited: &str, healthy: &[&str]) {
    for symbol in healthy {
        Mock::given(method("GET"))
            .and(path("/stock/metric"))
            .and(query_param("symbol", *symbol))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "metric": { "peTTM": 24.0 } })))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/stock/metric"))
        .and(query_param("symbol", limited))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stock/filings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "form": "10-Q" },
            { "form": "8-K" }
        ])))
        .mount(server)
        .await;
}

#[test(tokio::test)]
async fn test_rate_limit_on_fifth_symbol_publishes_first_four() {
    logging::log_test_step("screener stops on 429");
    let server = MockServer::start().await;
    finnhub_with_limit_on(&server, "S05", &["S01", "S02", "S03", "S04"]).await;

    let test_store = fresh_store().await;
    let symbols: Vec<SymbolRecord> = (1..=10).map(|i| SymbolRecord::imported(format!("S{:02}", i))).collect();
    test_store.store.upsert_symbols(&symbols).await.unwrap();
    test_store
        .store
        .set_document(COLLECTION, "STALE", &stale_stock())
        .await
        .unwrap();

    let financial: Arc<dyn FinancialDataProvider> =
        Arc::new(FinnhubClient::new(server.uri(), Some("test-key".to_string())).unwrap());
    let gatherer = MetricsGatherer::new(
        financial.clone(),
        Arc::new(NewsApiClient::new(server.uri(), None).unwrap()),
        Arc::new(GroqSentimentClient::new(server.uri(), None, "test-model").unwrap()),
    )
    .with_policies(policies::no_wait(3), policies::no_wait(3))
    .with_pacing(ApiRateLimiter::from_delay_ms(0));

    let symbol_store: Arc<dyn SymbolStore> = test_store.store.clone();
    let screener = Screener::new(
        Some(symbol_store),
        test_store.store.clone(),
        financial,
        gatherer,
        COLLECTION,
    )
    .with_universe(UniverseStrategy::Table, 10);

    let report = screener.run(false).await.unwrap();

    assert!(report.rate_limited);
    assert_eq!(report.universe_size, 10);
    assert_eq!(report.scored, 4);
    assert!(report.published);
    assert!(report.top.windows(2).all(|w| w[0].score >= w[1].score));

    let mut top: Vec<&str> = report.top.iter().map(|s| s.symbol.as_str()).collect();
    top.sort();
    assert_eq!(top, vec!["S01", "S02", "S03", "S04"]);
    for stock in &report.top {
        assert_eq!(stock.pe, 24.0);
        assert_eq!(stock.sec_filings_count, 1);
    }

    assert_eq!(
        test_store.store.list_document_ids(COLLECTION).await.unwrap(),
        vec!["S01", "S02", "S03", "S04"]
    );
}

fn stale_stock() -> ticker_pipeline::models::ScoredStock {
    ticker_pipeline::models::ScoredStock {
        symbol: "STALE".to_string(),
        score: 1.0,
        pe: 1.0,
        sentiment: 0.5,
        volume_surge: 1.0,
        sec_filings_count: 0,
        timestamp: chrono::Utc::now(),
    }
}
