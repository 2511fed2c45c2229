//! Discord webhook notifications for exits

use crate::services::exit_executor::ExitOutcome;
use crate::types::ExitTrigger;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

/// Discord webhook client for exit alerts
#[derive(Clone)]
pub struct DiscordWebhook {
    client: Client,
    webhook_url: String,
}

impl DiscordWebhook {
    pub fn new(webhook_url: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, webhook_url }
    }

    /// Send an alert for a finished exit. Failures are logged, never returned.
    pub async fn send_exit_alert(&self, mint: &str, trigger: &ExitTrigger, outcome: &ExitOutcome) {
        let payload = exit_embed(mint, trigger, outcome);

        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Discord alert sent for {} ({})", mint, trigger.label());
                } else {
                    error!("Discord webhook failed: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send Discord webhook: {}", e);
            }
        }
    }
}

fn exit_embed(mint: &str, trigger: &ExitTrigger, outcome: &ExitOutcome) -> Value {
    let (title, color, result) = match outcome {
        ExitOutcome::Closed {
            proceeds,
            txid,
            exit_price,
        } => (
            format!("{} exit filled", trigger.label()),
            0x00FF00,
            format!("Sold for **{} SOL** at ${}\n`{}`", proceeds, exit_price, txid),
        ),
        ExitOutcome::Failed {
            attempts,
            last_error,
        } => (
            format!("{} exit FAILED", trigger.label()),
            0xFF0000,
            format!(
                "Gave up after {} attempts: {}\nPosition marked failed, manual action needed",
                attempts, last_error
            ),
        ),
    };

    json!({
        "embeds": [{
            "title": title,
            "description": trigger.reason(),
            "color": color,
            "fields": [
                {
                    "name": "Mint",
                    "value": format!("`{}`", mint),
                    "inline": false
                },
                {
                    "name": "Trigger Price",
                    "value": format!("${}", trigger.price()),
                    "inline": true
                },
                {
                    "name": "Result",
                    "value": result,
                    "inline": false
                }
            ],
            "url": format!("https://dexscreener.com/solana/{}", mint),
            "footer": {
                "text": "Moonshot TP/SL"
            },
            "timestamp": chrono::Utc::now().to_rfc3339()
        }]
    })
}
