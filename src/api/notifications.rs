//! Operational alerts: chat webhook for every run, SMS-via-email on failure.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use super::http_client;
use crate::error::PipelineError;
use crate::models::SmsConfig;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Sends run summaries and failure alerts. Every channel is optional and a
/// delivery failure is logged, never raised.
pub struct Notifier {
    client: Client,
    slack_webhook_url: Option<String>,
    sms: SmsConfig,
}

impl Notifier {
    pub fn new(slack_webhook_url: Option<String>, sms: SmsConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(Duration::from_secs(15), "ticker-pipeline/1.0")?,
            slack_webhook_url,
            sms,
        })
    }

    /// Post `{"text": ...}` to the chat webhook
    pub async fn send_slack(&self, text: &str) -> bool {
        let Some(url) = &self.slack_webhook_url else {
            info!("Slack not configured; skipping Slack.");
            return false;
        };

        match self.client.post(url).json(&WebhookPayload { text }).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!("Slack webhook returned {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Slack send error: {}", e);
                false
            }
        }
    }

    /// Text the gateway address, Mailgun first then SMTP
    pub async fn send_sms(&self, body: &str) -> bool {
        let Some(to) = self.sms.gateway_address.clone() else {
            info!("No SMS_GATEWAY_ADDRESS configured; skipping SMS.");
            return false;
        };

        let mut sent = false;
        if self.mailgun_configured() {
            sent = self.send_via_mailgun(&to, body).await;
        }
        if !sent && self.smtp_configured() {
            sent = self.send_via_smtp(&to, body).await;
        }
        if !sent {
            info!("No SMS provider succeeded; SMS skipped.");
        }
        sent
    }

    fn mailgun_configured(&self) -> bool {
        self.sms.mailgun_api_key.is_some() && self.sms.mailgun_domain.is_some()
    }

    fn smtp_configured(&self) -> bool {
        self.sms.smtp_host.is_some()
            && self.sms.smtp_port.is_some()
            && self.sms.smtp_user.is_some()
            && self.sms.smtp_pass.is_some()
    }

    async fn send_via_mailgun(&self, to: &str, body: &str) -> bool {
        let (Some(key), Some(domain)) = (&self.sms.mailgun_api_key, &self.sms.mailgun_domain) else {
            return false;
        };

        let url = format!(
            "{}/v3/{}/messages",
            self.sms.mailgun_base_url.trim_end_matches('/'),
            domain
        );
        let from = format!("market-pipeline@{}", domain);
        let form = [("from", from.as_str()), ("to", to), ("subject", ""), ("text", body)];

        match self
            .client
            .post(&url)
            .basic_auth("api", Some(key))
            .form(&form)
            .send()
            .await
        {
            Ok(resp) if matches!(resp.status().as_u16(), 200 | 201) => true,
            Ok(resp) => {
                warn!("Mailgun returned {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Mailgun error: {}", e);
                false
            }
        }
    }

    async fn send_via_smtp(&self, to: &str, body: &str) -> bool {
        let (Some(host), Some(port), Some(user), Some(pass)) = (
            self.sms.smtp_host.clone(),
            self.sms.smtp_port,
            self.sms.smtp_user.clone(),
            self.sms.smtp_pass.clone(),
        ) else {
            return false;
        };
        let to = to.to_string();
        let body = body.to_string();

        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let email = Message::builder()
                .from(user.parse()?)
                .to(to.parse()?)
                .subject("")
                .body(body)?;

            let transport = SmtpTransport::starttls_relay(&host)?
                .port(port)
                .credentials(Credentials::new(user, pass))
                .timeout(Some(Duration::from_secs(20)))
                .build();
            transport.send(&email)?;
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("SMTP error: {}", e);
                false
            }
            Err(e) => {
                warn!("SMTP task failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_slack_posts_text_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({ "text": "✅ done" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = Notifier::new(Some(format!("{}/hook", server.uri())), SmsConfig::default()).unwrap();
        assert!(notifier.send_slack("✅ done").await);
    }

    #[tokio::test]
    async fn test_unconfigured_channels_are_skipped() {
        let notifier = Notifier::new(None, SmsConfig::default()).unwrap();
        assert!(!notifier.send_slack("hello").await);
        assert!(!notifier.send_sms("hello").await);
    }

    #[tokio::test]
    async fn test_sms_via_mailgun() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages"))
            .and(header_exists("authorization"))
            .and(body_string_contains("Import+FAILED"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sms = SmsConfig {
            gateway_address: Some("5550001111@tmomail.net".to_string()),
            mailgun_api_key: Some("key-123".to_string()),
            mailgun_domain: Some("mg.example.com".to_string()),
            mailgun_base_url: server.uri(),
            ..SmsConfig::default()
        };
        let notifier = Notifier::new(None, sms).unwrap();
        assert!(notifier.send_sms("Import FAILED: boom").await);
    }

    #[tokio::test]
    async fn test_mailgun_rejection_without_smtp_reports_unsent() {
        let server = MockServer::start().await;
        Mock::given(path("/v3/mg.example.com/messages"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let sms = SmsConfig {
            gateway_address: Some("5550001111@tmomail.net".to_string()),
            mailgun_api_key: Some("bad".to_string()),
            mailgun_domain: Some("mg.example.com".to_string()),
            mailgun_base_url: server.uri(),
            ..SmsConfig::default()
        };
        let notifier = Notifier::new(None, sms).unwrap();
        assert!(!notifier.send_sms("Import FAILED").await);
    }
}
