//! Firestore REST access for the published top-stocks collection.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::DocumentStore;
use crate::api::http_client;
use crate::error::PipelineError;
use crate::models::ScoredStock;

const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const LIST_PAGE_SIZE: u32 = 300;

/// The parts of a Google service-account key file we need
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct StoredToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

enum TokenSource {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        signing_key: EncodingKey,
        current: Mutex<Option<StoredToken>>,
    },
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<DocumentName>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentName {
    name: String,
}

/// Firestore client bound to one project's default database
pub struct FirestoreClient {
    client: Client,
    documents_url: String,
    auth: TokenSource,
}

impl FirestoreClient {
    /// Authenticate with a service-account key given as a JSON string
    pub fn from_service_account_json(json: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| PipelineError::parse("FIREBASE_SERVICE_ACCOUNT_KEY", e))?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| PipelineError::parse("service account private_key", e))?;

        Ok(Self {
            client: http_client(Duration::from_secs(30), "ticker-pipeline/1.0")?,
            documents_url: documents_url(FIRESTORE_BASE_URL, &key.project_id),
            auth: TokenSource::ServiceAccount {
                key,
                signing_key,
                current: Mutex::new(None),
            },
        })
    }

    /// Local emulator; it accepts the fixed `owner` bearer token
    pub fn emulator(host: &str, project_id: &str) -> Result<Self> {
        let host = host.trim_start_matches("http://").trim_end_matches('/');
        Self::with_static_token(&format!("http://{}/v1", host), project_id, "owner")
    }

    pub fn with_static_token(base_url: &str, project_id: &str, token: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(30), "ticker-pipeline/1.0")?,
            documents_url: documents_url(base_url, project_id),
            auth: TokenSource::Static(token.to_string()),
        })
    }

    async fn access_token(&self) -> Result<String> {
        match &self.auth {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::ServiceAccount {
                key,
                signing_key,
                current,
            } => {
                let mut guard = current.lock().await;
                if let Some(token) = guard.as_ref() {
                    if token.expires_at > Utc::now() + chrono::Duration::minutes(5) {
                        return Ok(token.access_token.clone());
                    }
                }

                let fresh = self.exchange_jwt(key, signing_key).await?;
                let access_token = fresh.access_token.clone();
                *guard = Some(fresh);
                Ok(access_token)
            }
        }
    }

    async fn exchange_jwt(&self, key: &ServiceAccountKey, signing_key: &EncodingKey) -> Result<StoredToken> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &key.client_email,
            scope: DATASTORE_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, signing_key)?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Token exchange failed with status {}: {}", status, error_text));
        }

        let token: TokenResponse = response.json().await?;
        info!("Firestore access token obtained for {}", key.client_email);
        Ok(StoredToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in - 60),
        })
    }

    async fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        Ok(builder.bearer_auth(self.access_token().await?))
    }

    /// URL of one document; `id` is always a single encoded path segment
    fn document_url(&self, collection: &str, id: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.documents_url, collection))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Firestore base URL cannot hold a path: {}", self.documents_url))?
            .push(id);
        Ok(url)
    }

    async fn ensure_success(response: Response, action: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(PipelineError::Store(format!("Firestore {} returned {}: {}", action, status, body)).into())
    }
}

fn documents_url(base_url: &str, project_id: &str) -> String {
    format!(
        "{}/projects/{}/databases/(default)/documents",
        base_url.trim_end_matches('/'),
        project_id
    )
}

/// Firestore typed-value encoding of a published stock
pub fn stock_to_fields(stock: &ScoredStock) -> Value {
    json!({
        "fields": {
            "symbol": { "stringValue": stock.symbol },
            "score": { "doubleValue": stock.score },
            "pe": { "doubleValue": stock.pe },
            "sentiment": { "doubleValue": stock.sentiment },
            "volumeSurge": { "doubleValue": stock.volume_surge },
            "secFilingsCount": { "integerValue": stock.sec_filings_count.to_string() },
            "timestamp": { "timestampValue": stock.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true) }
        }
    })
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn list_document_ids(&self, collection: &str) -> Result<Vec<String>> {
        let url = format!("{}/{}", self.documents_url, collection);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("pageSize", LIST_PAGE_SIZE.to_string()),
                ("mask.fieldPaths", "symbol".to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let request = self.authed(self.client.get(&url).query(&query)).await?;
            let response = Self::ensure_success(request.send().await?, "list").await?;
            let page: ListResponse = response.json().await?;

            ids.extend(
                page.documents
                    .iter()
                    .filter_map(|d| d.name.rsplit('/').next())
                    .map(str::to_string),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("{} documents in {}", ids.len(), collection);
        Ok(ids)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let url = self.document_url(collection, id)?;
        let request = self.authed(self.client.delete(url)).await?;
        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!("Document {} already gone", id);
            return Ok(());
        }
        Self::ensure_success(response, "delete").await?;
        Ok(())
    }

    async fn set_document(&self, collection: &str, id: &str, stock: &ScoredStock) -> Result<()> {
        let url = self.document_url(collection, id)?;
        let request = self
            .authed(self.client.patch(url).json(&stock_to_fields(stock)))
            .await?;
        Self::ensure_success(request.send().await?, "write").await?;
        Ok(())
    }
}

/// Named Firestore clients, created at most once per name.
#[derive(Default)]
pub struct FirestoreRegistry {
    apps: Mutex<HashMap<String, Arc<FirestoreClient>>>,
}

impl FirestoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the client registered as `name`, creating it with `create` on
    /// first use
    pub async fn get_or_create<F>(&self, name: &str, create: F) -> Result<Arc<FirestoreClient>>
    where
        F: FnOnce() -> Result<FirestoreClient>,
    {
        let mut apps = self.apps.lock().await;
        if let Some(existing) = apps.get(name) {
            debug!("Reusing Firestore app {}", name);
            return Ok(existing.clone());
        }

        let client = Arc::new(create()?);
        apps.insert(name.to_string(), client.clone());
        info!("Firebase app {} initialized", name);
        Ok(client)
    }

    pub async fn len(&self) -> usize {
        self.apps.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.apps.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/v1/projects/demo/databases/(default)/documents";

    fn stock(symbol: &str) -> ScoredStock {
        ScoredStock {
            symbol: symbol.to_string(),
            score: 7.25,
            pe: 22.0,
            sentiment: 0.6,
            volume_surge: 2.5,
            sec_filings_count: 3,
            timestamp: DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_fields_encoding() {
        let fields = stock_to_fields(&stock("AAPL"));
        assert_eq!(fields["fields"]["symbol"]["stringValue"], "AAPL");
        assert_eq!(fields["fields"]["secFilingsCount"]["integerValue"], "3");
        assert_eq!(fields["fields"]["volumeSurge"]["doubleValue"], 2.5);
        assert_eq!(
            fields["fields"]["timestamp"]["timestampValue"],
            "2025-06-01T12:00:00.000000Z"
        );
    }

    #[test]
    fn test_bad_service_account_is_rejected() {
        let json = r#"{"project_id":"p","client_email":"x@p.iam","private_key":"not a key"}"#;
        assert!(FirestoreClient::from_service_account_json(json).is_err());
        assert!(FirestoreClient::from_service_account_json("{").is_err());
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let server = MockServer::start().await;
        let collection = "artifacts/app/public/data/topStocks";

        Mock::given(method("GET"))
            .and(path(format!("{}/{}", DOCS, collection)))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [ { "name": format!("projects/demo/databases/(default)/documents/{}/MSFT", collection) } ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/{}", DOCS, collection)))
            .and(header("authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [ { "name": format!("projects/demo/databases/(default)/documents/{}/AAPL", collection) } ],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        let client = FirestoreClient::with_static_token(&format!("{}/v1", server.uri()), "demo", "owner").unwrap();
        let ids = client.list_document_ids(collection).await.unwrap();
        assert_eq!(ids, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn test_set_patches_document_by_symbol() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/c/NVDA", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = FirestoreClient::with_static_token(&format!("{}/v1", server.uri()), "demo", "t").unwrap();
        client.set_document("c", "NVDA", &stock("NVDA")).await.unwrap();
    }

    #[tokio::test]
    async fn test_document_id_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(format!("{}/c/BRK%2FB", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{}/c/WHAT%3FX%23Y", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = FirestoreClient::with_static_token(&format!("{}/v1", server.uri()), "demo", "t").unwrap();
        client.set_document("c", "BRK/B", &stock("BRK/B")).await.unwrap();
        client.delete_document("c", "WHAT?X#Y").await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_creates_once() {
        let registry = FirestoreRegistry::new();
        let first = registry
            .get_or_create("screener_app_x", || FirestoreClient::emulator("localhost:8080", "demo"))
            .await
            .unwrap();
        let second = registry
            .get_or_create("screener_app_x", || Err(anyhow!("factory must not run twice")))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }
}
