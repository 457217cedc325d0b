//! Throwaway SQLite stores for end-to-end tests

use std::sync::Arc;
use tempfile::TempDir;
use ticker_pipeline::database::SqliteStore;

/// A file-backed store that lives as long as its temp directory
pub struct TestStore {
    pub store: Arc<SqliteStore>,
    _dir: TempDir,
}

pub async fn fresh_store() -> TestStore {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("pipeline.db");
    let store = SqliteStore::new(path.to_str().expect("utf-8 path"))
        .await
        .expect("open sqlite store");
    TestStore {
        store: Arc::new(store),
        _dir: dir,
    }
}
