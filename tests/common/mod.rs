//! Common test utilities and helpers

pub mod database;

pub use database::{fresh_store, TestStore};

/// Logging utilities for tests; the subscriber itself comes from `test_log::test`
pub mod logging {
    use tracing::info;

    pub fn log_test_step(step: &str) {
        info!("🧪 {}", step);
    }
}

/// Zero-delay retry policies so failure paths run instantly
pub mod policies {
    use ticker_pipeline::api::RetryPolicy;

    pub fn no_wait(attempts: u32) -> RetryPolicy {
        RetryPolicy::immediate(attempts)
    }
}
