//! Budget-alert delivery over email and webhooks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// One configured delivery target, stored as JSON on the alert row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationChannel {
    Email { address: String },
    Webhook { url: String },
}

impl NotificationChannel {
    fn target(&self) -> &str {
        match self {
            NotificationChannel::Email { address } => address,
            NotificationChannel::Webhook { url } => url,
        }
    }
}

/// Parse an alert's `channels` column. Unreadable entries are skipped.
#[must_use]
pub fn parse_channels(value: &serde_json::Value) -> Vec<NotificationChannel> {
    let Some(items) = value.as_array() else {
        if !value.is_null() {
            tracing::warn!(%value, "alert channels are not a JSON array");
        }
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::warn!(%item, error = %e, "skipping unreadable alert channel");
                None
            }
        })
        .collect()
}

/// Payload delivered for a triggered budget alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub alert_id: Uuid,
    pub user_id: String,
    pub org_id: Option<String>,
    pub classification: String,
    pub period: String,
    pub spend_usd: Decimal,
    pub threshold_usd: Decimal,
    pub percent: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl AlertNotification {
    fn subject(&self) -> String {
        format!(
            "AI budget {}: {}% of ${} {} limit",
            self.classification, self.percent, self.threshold_usd, self.period
        )
    }

    fn text(&self) -> String {
        format!(
            "AI spend for the current {} period is ${} ({}% of the ${} threshold).\nPeriod: {} to {}.",
            self.period,
            self.spend_usd,
            self.percent,
            self.threshold_usd,
            self.period_start.to_rfc3339(),
            self.period_end.to_rfc3339()
        )
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{target} answered with status {status}")]
    UnexpectedStatus { status: u16, target: String },

    #[error("{0} delivery is not configured")]
    NotConfigured(&'static str),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        channel: &NotificationChannel,
        notification: &AlertNotification,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Default)]
pub struct EmailApi {
    pub url: String,
    pub api_key: Option<String>,
}

/// Delivers webhooks as JSON POSTs and email through a transactional-email
/// HTTP API.
pub struct HttpNotifier {
    client: reqwest::Client,
    email: Option<EmailApi>,
}

impl HttpNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(
        timeout: Duration,
        user_agent: &str,
        email: Option<EmailApi>,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, email })
    }

    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn from_app_config(config: &mentions_core::AppConfig) -> Result<Self, NotifyError> {
        let email = config.email_api_url.clone().map(|url| EmailApi {
            url,
            api_key: config.email_api_key.clone(),
        });
        Self::new(
            Duration::from_secs(config.fetch_timeout_secs),
            &config.fetch_user_agent,
            email,
        )
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<(), NotifyError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::UnexpectedStatus {
                status: status.as_u16(),
                target: url.to_owned(),
            });
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct EmailMessage<'a> {
    to: &'a str,
    subject: String,
    text: String,
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(
        &self,
        channel: &NotificationChannel,
        notification: &AlertNotification,
    ) -> Result<(), NotifyError> {
        match channel {
            NotificationChannel::Webhook { url } => {
                self.post_json(url, None, notification).await
            }
            NotificationChannel::Email { address } => {
                let api = self.email.as_ref().ok_or(NotifyError::NotConfigured("email"))?;
                let message = EmailMessage {
                    to: address,
                    subject: notification.subject(),
                    text: notification.text(),
                };
                self.post_json(&api.url, api.api_key.as_deref(), &message)
                    .await
            }
        }
    }
}

/// Send `notification` to every channel in its own task. Failures are logged
/// and never reach the caller. Returns the number of deliveries started.
pub fn dispatch_best_effort(
    notifier: &Arc<dyn Notifier>,
    channels: Vec<NotificationChannel>,
    notification: AlertNotification,
) -> usize {
    let count = channels.len();
    let notification = Arc::new(notification);
    for channel in channels {
        let notifier = Arc::clone(notifier);
        let notification = Arc::clone(&notification);
        tokio::spawn(async move {
            match notifier.send(&channel, &notification).await {
                Ok(()) => tracing::info!(
                    alert_id = %notification.alert_id,
                    target = channel.target(),
                    "budget alert delivered"
                ),
                Err(e) => tracing::warn!(
                    alert_id = %notification.alert_id,
                    target = channel.target(),
                    error = %e,
                    "budget alert delivery failed"
                ),
            }
        });
    }
    count
}
