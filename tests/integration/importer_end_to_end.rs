use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use test_log::test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ticker_pipeline::api::Notifier;
use ticker_pipeline::database::SymbolStore;
use ticker_pipeline::importer::{
    Importer, SourceCatalog, SourceCategory, SourceChain, SourceEndpoint, SourceFetcher, SourceFormat, SymbolFilter,
};
use ticker_pipeline::models::{ImportStatus, SmsConfig};

use crate::common::{fresh_store, logging, policies};

fn single_source(name: &str, url: String) -> SourceCategory {
    SourceCategory {
        name: name.to_string(),
        chains: vec![SourceChain {
            label: name.to_string(),
            endpoints: vec![SourceEndpoint {
                url,
                format: SourceFormat::Csv {
                    columns: vec!["Symbol".to_string(), "Ticker".to_string()],
                },
            }],
        }],
    }
}

#[test(tokio::test)]
async fn test_import_filters_dedupes_and_records_failed_source() {
    logging::log_test_step("importer end to end");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Symbol\nAAPL\nSPY ETF\naapl\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("Symbol\nMSFT\n")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let test_store = fresh_store().await;
    let catalog = SourceCatalog {
        categories: vec![
            single_source("listing", format!("{}/listing.csv", server.uri())),
            single_source("slow", format!("{}/slow.csv", server.uri())),
        ],
    };
    let importer = Importer::new(
        test_store.store.clone(),
        Notifier::new(Some(format!("{}/hook", server.uri())), SmsConfig::default()).unwrap(),
        SourceFetcher::with_timeout(policies::no_wait(3), Duration::from_millis(100)).unwrap(),
        catalog,
        SymbolFilter::default(),
    );

    let report = importer.run().await.unwrap();

    assert_eq!(report.raw_count, 3);
    assert_eq!(report.filtered_count, 1);
    assert_eq!(report.failed_sources, vec!["slow"]);
    assert_eq!(test_store.store.fetch_symbols().await.unwrap(), vec!["AAPL"]);

    let stats = test_store.store.recent_import_stats(5).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].status, ImportStatus::Success);
    assert_eq!(stats[0].fetched_count, 3);
    assert_eq!(stats[0].filtered_count, 1);
}

#[test(tokio::test)]
async fn test_rerun_upserts_instead_of_duplicating() {
    let server = MockServer::start().await;
    Mock::given(path("/listing.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Ticker\nIBM\nGE\n"))
        .mount(&server)
        .await;

    let test_store = fresh_store().await;
    let store: Arc<dyn SymbolStore> = test_store.store.clone();
    for _ in 0..2 {
        let importer = Importer::new(
            store.clone(),
            Notifier::new(None, SmsConfig::default()).unwrap(),
            SourceFetcher::new(policies::no_wait(1)).unwrap(),
            SourceCatalog {
                categories: vec![single_source("listing", format!("{}/listing.csv", server.uri()))],
            },
            SymbolFilter::default(),
        );
        importer.run().await.unwrap();
    }

    assert_eq!(store.fetch_symbols().await.unwrap(), vec!["GE", "IBM"]);
    assert_eq!(test_store.store.recent_import_stats(10).await.unwrap().len(), 2);
}
