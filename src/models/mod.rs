use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Longest ticker string accepted into the symbols table
pub const MAX_SYMBOL_LEN: usize = 12;

/// Tag written to `symbols.source` by the importer
pub const IMPORT_SOURCE_TAG: &str = "hybrid-import";

/// Default fund/ETF indicator substrings
pub const DEFAULT_ETF_KEYWORDS: &[&str] = &["ETF", "ETN", "FUND", "TRUST", "INDEX", "EXCHANGE TRADED"];

/// Row in the shared `symbols` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: String,
    pub is_valid: Option<bool>,
    pub source: String,
    pub last_checked: Option<DateTime<Utc>>,
}

impl SymbolRecord {
    pub fn imported(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            is_valid: None,
            source: IMPORT_SOURCE_TAG.to_string(),
            last_checked: None,
        }
    }
}

/// Outcome tag of an importer run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Success,
    Failure,
    Error,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "success",
            ImportStatus::Failure => "failure",
            ImportStatus::Error => "error",
        }
    }
}

/// Row appended to `import_stats` once per importer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportStats {
    pub fetched_count: usize,
    pub filtered_count: usize,
    pub status: ImportStatus,
    pub error: Option<String>,
}

/// Raw per-symbol inputs to the composite score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockMetrics {
    pub pe: f64,
    pub sentiment: f64,
    pub volume_surge_factor: f64,
    pub sec_filings_count: u32,
}

/// Published top-stock document; key names match the front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredStock {
    pub symbol: String,
    pub score: f64,
    pub pe: f64,
    pub sentiment: f64,
    pub volume_surge: f64,
    pub sec_filings_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Where the screener gets its symbol universe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UniverseStrategy {
    /// Read the importer's symbols table
    Table,
    /// Related tickers from general market news plus large caps
    News,
}

impl std::str::FromStr for UniverseStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(UniverseStrategy::Table),
            "news" => Ok(UniverseStrategy::News),
            other => Err(PipelineError::parse("SCREENER_UNIVERSE", format!("unknown strategy '{}'", other))),
        }
    }
}

/// Relational store selection
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    Supabase { url: String, key: String },
    Sqlite { path: String },
}

/// Credentials for the SMS-via-email gateway
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmsConfig {
    pub gateway_address: Option<String>,
    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
    pub mailgun_base_url: String,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
}

/// Document store selection for the screener
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentStoreConfig {
    Firestore { service_account_json: String },
    FirestoreEmulator { host: String, project_id: String },
    Sqlite { path: String },
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub store: Option<StoreConfig>,
    pub slack_webhook_url: Option<String>,
    pub sms: SmsConfig,
    pub finnhub_api_key: Option<String>,
    pub finnhub_base_url: String,
    pub newsapi_key: Option<String>,
    pub newsapi_base_url: String,
    pub groq_api_key: Option<String>,
    pub groq_base_url: String,
    pub groq_model: String,
    pub firebase_service_account: Option<String>,
    pub firestore_emulator_host: Option<String>,
    pub firebase_project_id: Option<String>,
    pub database_path: Option<String>,
    pub app_id: String,
    pub target_symbol_count: usize,
    pub universe: UniverseStrategy,
    pub request_delay_ms: u64,
    pub etf_keywords: Vec<String>,
    pub exclude_preferred: bool,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let database_path = env_opt("DATABASE_PATH");
        let store = match (env_opt("SUPABASE_URL"), env_opt("SUPABASE_ANON_KEY")) {
            (Some(url), Some(key)) => Some(StoreConfig::Supabase { url, key }),
            _ => database_path.clone().map(|path| StoreConfig::Sqlite { path }),
        };

        let etf_keywords = match env_opt("ETF_KEYWORDS") {
            Some(list) => list
                .split(',')
                .map(|k| k.trim().to_uppercase())
                .filter(|k| !k.is_empty())
                .collect(),
            None => DEFAULT_ETF_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };

        Ok(Config {
            store,
            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
            sms: SmsConfig {
                gateway_address: env_opt("SMS_GATEWAY_ADDRESS"),
                mailgun_api_key: env_opt("MAILGUN_API_KEY"),
                mailgun_domain: env_opt("MAILGUN_DOMAIN"),
                mailgun_base_url: env_or("MAILGUN_BASE_URL", "https://api.mailgun.net"),
                smtp_host: env_opt("SMTP_HOST"),
                smtp_port: env_opt("SMTP_PORT").and_then(|p| p.parse().ok()),
                smtp_user: env_opt("SMTP_USER"),
                smtp_pass: env_opt("SMTP_PASS"),
            },
            finnhub_api_key: env_opt("FINANCIAL_API_KEY"),
            finnhub_base_url: env_or("FINNHUB_BASE_URL", "https://finnhub.io/api/v1"),
            newsapi_key: env_opt("NEWSAPI_KEY"),
            newsapi_base_url: env_or("NEWSAPI_BASE_URL", "https://newsapi.org"),
            groq_api_key: env_opt("GROQ_API_KEY"),
            groq_base_url: env_or("GROQ_BASE_URL", "https://api.groq.com/openai/v1"),
            groq_model: env_or("GROQ_MODEL", "llama-3.1-8b-instant"),
            firebase_service_account: env_opt("FIREBASE_SERVICE_ACCOUNT_KEY"),
            firestore_emulator_host: env_opt("FIRESTORE_EMULATOR_HOST"),
            firebase_project_id: env_opt("FIREBASE_PROJECT_ID"),
            database_path,
            app_id: env_or("APP_ID", "default-app-id"),
            target_symbol_count: env_opt("TARGET_SYMBOL_COUNT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            universe: env_opt("SCREENER_UNIVERSE")
                .map(|v| v.parse::<UniverseStrategy>())
                .transpose()?
                .unwrap_or(UniverseStrategy::Table),
            request_delay_ms: env_opt("REQUEST_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            etf_keywords,
            exclude_preferred: env_opt("EXCLUDE_PREFERRED")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    /// Backing store credentials are mandatory for the importer
    pub fn require_store(&self) -> Result<&StoreConfig, PipelineError> {
        self.store.as_ref().ok_or_else(|| {
            PipelineError::MissingConfig(
                "SUPABASE_URL and SUPABASE_ANON_KEY (or DATABASE_PATH)".to_string(),
            )
        })
    }

    /// The screener cannot publish without a document store
    pub fn require_document_store(&self) -> Result<DocumentStoreConfig, PipelineError> {
        if let Some(host) = &self.firestore_emulator_host {
            return Ok(DocumentStoreConfig::FirestoreEmulator {
                host: host.clone(),
                project_id: self
                    .firebase_project_id
                    .clone()
                    .unwrap_or_else(|| "demo-screener".to_string()),
            });
        }
        if let Some(json) = &self.firebase_service_account {
            return Ok(DocumentStoreConfig::Firestore {
                service_account_json: json.clone(),
            });
        }
        if let Some(path) = &self.database_path {
            return Ok(DocumentStoreConfig::Sqlite { path: path.clone() });
        }
        Err(PipelineError::MissingConfig(
            "FIREBASE_SERVICE_ACCOUNT_KEY (or FIRESTORE_EMULATOR_HOST / DATABASE_PATH)".to_string(),
        ))
    }

    /// Firestore collection consumed by the front-end
    pub fn collection_path(&self) -> String {
        format!("artifacts/{}/public/data/topStocks", self.app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bare_config() -> Config {
        Config {
            store: None,
            slack_webhook_url: None,
            sms: SmsConfig::default(),
            finnhub_api_key: None,
            finnhub_base_url: String::new(),
            newsapi_key: None,
            newsapi_base_url: String::new(),
            groq_api_key: None,
            groq_base_url: String::new(),
            groq_model: String::new(),
            firebase_service_account: None,
            firestore_emulator_host: None,
            firebase_project_id: None,
            database_path: None,
            app_id: "default-app-id".to_string(),
            target_symbol_count: 50,
            universe: UniverseStrategy::Table,
            request_delay_ms: 0,
            etf_keywords: Vec::new(),
            exclude_preferred: false,
        }
    }

    #[test]
    fn test_missing_store_is_fatal() {
        let config = bare_config();
        assert!(matches!(config.require_store(), Err(PipelineError::MissingConfig(_))));
        assert!(matches!(
            config.require_document_store(),
            Err(PipelineError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_emulator_wins_over_service_account() {
        let mut config = bare_config();
        config.firebase_service_account = Some("{}".to_string());
        config.firestore_emulator_host = Some("localhost:8080".to_string());
        assert_eq!(
            config.require_document_store().unwrap(),
            DocumentStoreConfig::FirestoreEmulator {
                host: "localhost:8080".to_string(),
                project_id: "demo-screener".to_string(),
            }
        );
    }

    #[test]
    fn test_collection_path() {
        let mut config = bare_config();
        config.app_id = "prod".to_string();
        assert_eq!(config.collection_path(), "artifacts/prod/public/data/topStocks");
    }

    #[test]
    fn test_scored_stock_uses_front_end_keys() {
        let stock = ScoredStock {
            symbol: "AAPL".to_string(),
            score: 7.5,
            pe: 28.0,
            sentiment: 0.7,
            volume_surge: 2.0,
            sec_filings_count: 1,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&stock).unwrap();
        assert!(json.get("volumeSurge").is_some());
        assert!(json.get("secFilingsCount").is_some());
        assert_eq!(json["symbol"], "AAPL");
    }

    #[test]
    fn test_universe_from_str() {
        assert_eq!("News".parse::<UniverseStrategy>().unwrap(), UniverseStrategy::News);
        assert!("wiki".parse::<UniverseStrategy>().is_err());
    }
}
