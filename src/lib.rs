pub mod api;
pub mod database;
pub mod error;
pub mod importer;
pub mod models;
pub mod screener;

pub use error::PipelineError;
pub use models::Config;
