use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{AlertMessage, Notifier, SeriesAlert};

/// Settings for a JSON transactional-email API.
#[derive(Clone, Debug)]
pub struct EmailApiConfig {
    /// Full URL of the send endpoint, e.g. `https://api.brevo.com/v3/smtp/email`.
    pub api_url: String,
    pub api_key: String,
    pub sender_name: String,
    pub sender_email: String,
    pub dashboard_url: Option<String>,
}

#[derive(Serialize)]
struct Contact<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest<'a> {
    sender: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: &'a str,
    html_content: &'a str,
    text_content: &'a str,
}

/// Delivers alerts as e-mail through an HTTP transactional-email API.
#[derive(Clone, Debug)]
pub struct EmailApiNotifier {
    client: Client,
    config: EmailApiConfig,
}

impl EmailApiNotifier {
    pub fn new(config: EmailApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Notifier for EmailApiNotifier {
    async fn send(&self, alert: &SeriesAlert) -> bool {
        let message = AlertMessage::render(alert, self.config.dashboard_url.as_deref());
        let payload = SendEmailRequest {
            sender: Contact {
                name: Some(&self.config.sender_name),
                email: &self.config.sender_email,
            },
            to: vec![Contact {
                name: None,
                email: &alert.subscriber_address,
            }],
            subject: &message.subject,
            html_content: &message.html,
            text_content: &message.text,
        };
        let response = match self
            .client
            .post(&self.config.api_url)
            .header("api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    series = %alert.series_code,
                    recipient = %alert.subscriber_address,
                    error = %err,
                    "alert e-mail request failed"
                );
                return false;
            }
        };
        let status = response.status();
        if status.is_success() {
            debug!(series = %alert.series_code, %status, "alert e-mail accepted");
            return true;
        }
        let body = response.text().await.unwrap_or_default();
        warn!(
            series = %alert.series_code,
            recipient = %alert.subscriber_address,
            %status,
            body = %body.chars().take(256).collect::<String>(),
            "alert e-mail rejected by provider"
        );
        false
    }
}
