//! Outgoing mail for account and invitation events.

use std::time::{Duration, Instant};

use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::models::OutboxEvent;

use super::types::{AccessInvitedPayload, EventType, UserRegisteredPayload};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("build client failed: {0}")]
    Client(reqwest::Error),
    #[error("send failed: {0}")]
    Send(#[from] reqwest::Error),
    #[error("mail API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed event payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct Mailer {
    client: Option<Client>,
    config: MailConfig,
}

impl Mailer {
    pub fn new(config: MailConfig) -> Result<Self, MailError> {
        let client = if config.is_configured() {
            Some(
                ClientBuilder::new()
                    .user_agent("estatehub/0.1 (+reqwest)")
                    .tcp_nodelay(true)
                    .pool_idle_timeout(Duration::from_secs(30))
                    .timeout(Duration::from_secs(30))
                    .build()
                    .map_err(MailError::Client)?,
            )
        } else {
            None
        };
        Ok(Self { client, config })
    }

    /// Sends through the HTTP mail API, or logs the message when no API is
    /// configured.
    pub async fn send(&self, email: &SendEmail) -> Result<(), MailError> {
        let (Some(client), Some(api_url), Some(api_key)) = (
            &self.client,
            self.config.api_url.as_deref(),
            self.config.api_key.as_deref(),
        ) else {
            info!(to = ?email.to, subject = %email.subject, body = %email.text, "Mail API not configured, message logged only");
            return Ok(());
        };

        let started = Instant::now();
        let res = client
            .post(api_url)
            .bearer_auth(api_key)
            .json(email)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        debug!(status = %status, elapsed_ms = started.elapsed().as_millis() as u64, "Mail API responded");

        if status.is_success() {
            Ok(())
        } else {
            Err(MailError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Builds the message for an outbox event, if the event sends mail.
    pub fn compose(&self, event: &OutboxEvent) -> Result<Option<SendEmail>, MailError> {
        let data = event
            .payload
            .get("data")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let app_url = self.config.app_url.trim_end_matches('/');

        let message = if event.event_type == EventType::UserRegistered.as_str() {
            let p: UserRegisteredPayload = serde_json::from_value(data)?;
            let greeting = p.full_name.as_deref().unwrap_or("there");
            Some((
                p.email,
                "Confirm your email address".to_string(),
                format!(
                    "Hi {},\n\nConfirm your address to finish setting up your account:\n{}/verify-email?token={}\n",
                    greeting, app_url, p.verification_token
                ),
            ))
        } else if event.event_type == EventType::AccessInvited.as_str() {
            let p: AccessInvitedPayload = serde_json::from_value(data)?;
            let link = match (p.verification_token, p.needs_password) {
                (Some(token), true) => {
                    format!("Set your password to get started:\n{}/complete-registration?token={}", app_url, token)
                }
                (Some(token), false) => {
                    format!("Verify your email address to activate access:\n{}/verify-email?token={}", app_url, token)
                }
                (None, _) => format!("Sign in to get started:\n{}/login", app_url),
            };
            Some((
                p.email,
                format!("You have been invited to {}", p.company_name),
                format!(
                    "You have been given the {} role at {}.\n\n{}\n",
                    p.role, p.company_name, link
                ),
            ))
        } else {
            None
        };

        Ok(message.map(|(to, subject, text)| SendEmail {
            from: self.config.from_address.clone(),
            to: vec![to],
            subject,
            text,
        }))
    }
}
