//! Slack incoming-webhook notifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::Notifier;
use crate::error::Result;
use crate::governor::TokenBucket;
use crate::model::OPERATOR_NAME;

/// See <https://api.slack.com/apis/rate-limits>
const MESSAGES_PER_SECOND: u32 = 1;
const MESSAGES_PER_BURST: u32 = 10;

const ICON_EMOJI: &str = ":up:";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    channel: &'a str,
    text: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
}

/// Posts messages to a Slack channel, paced by a shared token bucket
pub struct SlackNotifier {
    http: Client,
    webhook_url: String,
    channel: String,
    limiter: TokenBucket,
    cancel: CancellationToken,
}

impl SlackNotifier {
    /// `cancel` aborts pending rate-limit waits, e.g. on shutdown
    pub fn new(webhook_url: &str, channel: &str, cancel: CancellationToken) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(OPERATOR_NAME)
            .build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
            channel: channel.to_string(),
            limiter: TokenBucket::new(MESSAGES_PER_SECOND, MESSAGES_PER_BURST),
            cancel,
        })
    }

    async fn post(&self, message: &str) -> Result<()> {
        let body = WebhookMessage {
            channel: &self.channel,
            text: message,
            username: OPERATOR_NAME,
            icon_emoji: ICON_EMOJI,
        };
        self.http
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, message: &str) {
        if let Err(e) = self.limiter.acquire(&self.cancel).await {
            warn!("Dropping Slack message while waiting for rate limit: {}", e);
            return;
        }
        match self.post(message).await {
            Ok(()) => debug!("Posted Slack message to {}", self.channel),
            Err(e) => error!(
                "Failed to post Slack message to channel {}: {} (message: {})",
                self.channel, e, message
            ),
        }
    }
}
