use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::message::build_alert_message;
use super::{AlertNotifier, NotifyError};
use crate::models::sync_history::SyncHistory;

pub const DEFAULT_API_URL: &str = "https://api.resend.com";

#[derive(Debug, Clone)]
pub struct ResendConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub to: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendError {
    message: String,
}

/// E-mail alerts through the Resend HTTP API.
pub struct ResendNotifier {
    client: Client,
    config: ResendConfig,
}

impl ResendNotifier {
    pub fn new(config: ResendConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl AlertNotifier for ResendNotifier {
    async fn send_failure_alert(&self, failures: &[SyncHistory]) -> Result<(), NotifyError> {
        let message = build_alert_message(failures, Utc::now());
        let body = SendEmailRequest {
            from: &self.config.from,
            to: [&self.config.to],
            subject: &message.subject,
            html: &message.html,
            text: &message.text,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ResendError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(NotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SendEmailResponse = response.json().await?;
        info!(email_id = ?sent.id, to = %self.config.to, "alert e-mail sent");
        Ok(())
    }
}
