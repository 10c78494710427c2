//! The delivery capability and its channel-kind router.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use deadman_core::channels::{CHANNEL_EMAIL, CHANNEL_WEBHOOK};
use deadman_core::status::CheckStatus;
use deadman_core::types::{DbId, Timestamp};
use deadman_db::models::channel::Channel;
use deadman_db::models::check::Check;
use serde::Serialize;
use uuid::Uuid;

use crate::delivery::email::{EmailDelivery, EmailError};
use crate::delivery::webhook::{WebhookDelivery, WebhookError};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error(transparent)]
    Email(#[from] EmailError),

    /// No transport is configured for the channel's kind.
    #[error("Unsupported channel kind: {0}")]
    Unsupported(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What a subscriber is told about a check.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub check_code: Uuid,
    pub check_name: String,
    pub project_id: DbId,
    pub status: CheckStatus,
    pub last_ping: Option<Timestamp>,
    pub n_pings: i64,
}

impl AlertPayload {
    pub fn new(check: &Check, status: CheckStatus) -> Self {
        Self {
            check_code: check.code,
            check_name: check.name.clone(),
            project_id: check.project_id,
            status,
            last_ping: check.last_ping,
            n_pings: check.n_pings,
        }
    }

    #[cfg(test)]
    pub(crate) fn sample() -> Self {
        use chrono::TimeZone;

        Self {
            check_code: Uuid::nil(),
            check_name: "nightly-backup".to_string(),
            project_id: 1,
            status: CheckStatus::Down,
            last_ping: chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single(),
            n_pings: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Sends one alert to one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        channel: &Channel,
        check: &Check,
        status: CheckStatus,
    ) -> Result<(), DeliveryError>;
}

/// Routes each channel to the transport for its kind.
pub struct ChannelNotifier {
    webhook: WebhookDelivery,
    email: Option<EmailDelivery>,
}

impl ChannelNotifier {
    /// Email channels fail as unsupported when `email` is `None`.
    pub fn new(webhook: WebhookDelivery, email: Option<EmailDelivery>) -> Self {
        Self { webhook, email }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(
        &self,
        channel: &Channel,
        check: &Check,
        status: CheckStatus,
    ) -> Result<(), DeliveryError> {
        let alert = AlertPayload::new(check, status);
        match channel.kind.as_str() {
            CHANNEL_WEBHOOK => Ok(self.webhook.deliver(&channel.value, &alert).await?),
            CHANNEL_EMAIL => match &self.email {
                Some(email) => Ok(email.deliver(&channel.value, &alert).await?),
                None => Err(DeliveryError::Unsupported(format!(
                    "{CHANNEL_EMAIL} (SMTP not configured)"
                ))),
            },
            other => Err(DeliveryError::Unsupported(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// One call observed by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub channel_id: DbId,
    pub check_id: DbId,
    pub status: CheckStatus,
}

/// Notifier that records alerts instead of sending them.
///
/// Channels whose kind is listed in `failing_kinds` fail with
/// [`DeliveryError::Unsupported`]; a non-zero `delay` makes every send
/// sleep first.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentAlert>>,
    failing_kinds: Vec<String>,
    delay: Duration,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(kinds: &[&str]) -> Self {
        Self {
            failing_kinds: kinds.iter().map(|k| k.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        channel: &Channel,
        check: &Check,
        status: CheckStatus,
    ) -> Result<(), DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing_kinds.iter().any(|k| *k == channel.kind) {
            return Err(DeliveryError::Unsupported(channel.kind.clone()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentAlert {
                channel_id: channel.id,
                check_id: check.id,
                status,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
