use anyhow::Result;
use tracing::info;

use crate::database::DocumentStore;
use crate::models::ScoredStock;

/// Replace the collection: delete every existing document, then write one
/// document per stock keyed by symbol.
pub async fn replace_collection(store: &dyn DocumentStore, collection: &str, stocks: &[ScoredStock]) -> Result<usize> {
    info!("Starting database update in collection: {}", collection);

    let existing = store.list_document_ids(collection).await?;
    for id in &existing {
        store.delete_document(collection, id).await?;
    }
    info!("🗑️ Existing documents cleared ({})", existing.len());

    for stock in stocks {
        store.set_document(collection, &stock.symbol, stock).await?;
        info!("📝 Wrote document: {} with score {:.3}", stock.symbol, stock.score);
    }

    info!("✅ Successfully updated {} stock documents", stocks.len());
    Ok(stocks.len())
}
