use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use sigforge_types::{parse_timestamp, PipelineResult, Result, SignalError, SignalRequest};

use crate::config::PipelineConfig;

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Downstream consumer of validated signals.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, request: &SignalRequest, result: &PipelineResult) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DiscordNotifier
// ---------------------------------------------------------------------------

/// Upper bound on one webhook delivery, response body included.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts a plain-text signal message to a Discord webhook.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: String,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: webhook_url.into(),
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `None` when no webhook is configured.
    pub fn from_config(config: &PipelineConfig) -> Option<Self> {
        config
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(Self::new)
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn notify(&self, _request: &SignalRequest, result: &PipelineResult) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.deliver(result)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SignalError::NotificationFailed {
                notifier: "discord".into(),
                message: format!("webhook timed out after {}ms", self.timeout.as_millis()),
            }),
        }
    }
}

impl DiscordNotifier {
    async fn deliver(&self, result: &PipelineResult) -> Result<()> {
        let body = json!({ "content": format_discord_message(result) });

        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SignalError::NotificationFailed {
                notifier: "discord".into(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SignalError::NotificationFailed {
                notifier: "discord".into(),
                message: format!("webhook returned {}: {}", status.as_u16(), text),
            });
        }

        tracing::info!(asset = %result.proposed_signal.asset, "signal sent to Discord");
        Ok(())
    }
}

/// Render the webhook message for a validated signal.
pub fn format_discord_message(result: &PipelineResult) -> String {
    let signal = &result.proposed_signal;
    let time = parse_timestamp(&signal.exact_timestamp)
        .map(|dt| dt.format("%b %-d, %Y, %I:%M %p UTC").to_string())
        .unwrap_or_else(|| signal.exact_timestamp.clone());

    let mut message = format!("AI's Proposed Signal: {}\n", signal.signal_identifier);
    message.push_str(&format!("Trade: {}\n", signal.trade_direction));
    message.push_str(&format!("Timeframe: {}\n", signal.timeframe));
    message.push_str(&format!("Entry Price: {}\n", signal.entry_price));
    message.push_str(&format!("Stop Loss (SL): {}\n", signal.stop_loss));
    message.push_str(&format!("Take Profit 1 (TP1): {}\n", signal.take_profit1));
    if let Some(tp2) = signal.take_profit2 {
        message.push_str(&format!("Take Profit 2 (TP2): {}\n", tp2));
    }
    message.push_str(&format!("AI Determined Signal Time (UTC): {}\n", time));
    message.push_str(&format!("AI's Reason for Proposal:\n{}", signal.reason));
    message
}
