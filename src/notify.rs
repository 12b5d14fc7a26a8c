//! Vote confirmations, sent to the voter after a successful commit.
//!
//! Delivery is best effort: a confirmation that fails or times out is logged
//! and dropped, and never affects the vote it confirms.

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_sns::Client as SnsClient;
use chrono::{DateTime, Utc};
use rocket::tokio;
use thiserror::Error;

use crate::model::{api::sms::Sms, common::VoteToken};

/// The notifier as held in managed state.
pub type SharedNotifier = Arc<dyn Notifier>;

/// Everything needed to tell a voter their vote was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteConfirmation {
    pub recipient: Sms,
    pub election_name: String,
    /// E.g. `"Jane Doe (Green Party)"`.
    pub candidate: String,
    pub vote_token: VoteToken,
    pub voted_at: DateTime<Utc>,
}

impl VoteConfirmation {
    /// The message text sent to the voter.
    pub fn message(&self) -> String {
        format!(
            "Your vote in {} for {} was recorded at {}. Vote token: {}",
            self.election_name,
            self.candidate,
            self.voted_at.format("%Y-%m-%d %H:%M UTC"),
            self.vote_token,
        )
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to publish confirmation: {0}")]
    Publish(String),
    #[error("Confirmation not sent within {0:?}")]
    Timeout(Duration),
}

/// Something that can deliver vote confirmations.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, confirmation: &VoteConfirmation) -> Result<(), NotifyError>;
}

/// Sends confirmations as SMS messages through Amazon SNS.
pub struct SnsNotifier {
    client: SnsClient,
}

impl SnsNotifier {
    pub fn new(client: SnsClient) -> Self {
        Self { client }
    }
}

#[rocket::async_trait]
impl Notifier for SnsNotifier {
    async fn send(&self, confirmation: &VoteConfirmation) -> Result<(), NotifyError> {
        self.client
            .publish()
            .phone_number(confirmation.recipient.e164())
            .message(confirmation.message())
            .send()
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Logs confirmations instead of sending them.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogNotifier;

#[rocket::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, confirmation: &VoteConfirmation) -> Result<(), NotifyError> {
        info!(
            "Confirmation for {}: {}",
            confirmation.recipient.e164(),
            confirmation.message()
        );
        Ok(())
    }
}

/// Send a confirmation, giving up after `timeout`.
pub async fn deliver(
    notifier: &dyn Notifier,
    confirmation: &VoteConfirmation,
    timeout: Duration,
) -> Result<(), NotifyError> {
    tokio::time::timeout(timeout, notifier.send(confirmation))
        .await
        .map_err(|_| NotifyError::Timeout(timeout))?
}
