//! Exit executor
//!
//! Sells the full quantity of a position through the trade API and records
//! the terminal outcome in the ledger:
//! - each attempt is one sell request; transport errors and rejected trades
//!   are retried alike, `1 + max_sell_retries` attempts in total
//! - success marks the position `Closed` with its exit price and proceeds
//! - exhaustion marks it `Failed`, which is never retried automatically
//!
//! `exit` does not return until the outcome is on disk. Retry counters are
//! in memory only, so a restart mid-retry leaves the position `Open` and the
//! next pass starts over with a fresh budget.

use super::clock::{sleep_or_cancel, Clock};
use super::metrics::Metrics;
use super::retry::{with_retry, RetryConfig};
use super::trade_api::{SellReceipt, TradeApi};
use crate::ledger::{self, LedgerError, LedgerHandle};
use crate::types::ExitTrigger;
use crate::webhook::DiscordWebhook;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Delay between sell attempts
pub const SELL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Terminal result of an exit
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    Closed {
        proceeds: Decimal,
        txid: String,
        exit_price: Decimal,
    },
    Failed {
        attempts: u32,
        last_error: String,
    },
}

impl ExitOutcome {
    pub fn is_closed(&self) -> bool {
        matches!(self, ExitOutcome::Closed { .. })
    }
}

/// An exit that stopped before its outcome reached the ledger
#[derive(Debug, Error)]
pub enum ExitError {
    #[error("exit for {mint} interrupted by shutdown")]
    Shutdown { mint: String },

    #[error("exit outcome for {mint} could not be recorded: {source}")]
    Ledger {
        mint: String,
        #[source]
        source: LedgerError,
    },
}

pub struct ExitExecutor {
    trade_api: Arc<dyn TradeApi>,
    ledger: LedgerHandle,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    ledger_retry_delay: Duration,
    shutdown: CancellationToken,
    metrics: Metrics,
    webhook: Option<DiscordWebhook>,
}

impl ExitExecutor {
    pub fn new(
        trade_api: Arc<dyn TradeApi>,
        ledger: LedgerHandle,
        clock: Arc<dyn Clock>,
        max_sell_retries: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            trade_api,
            ledger,
            clock,
            retry: RetryConfig::fixed(max_sell_retries, SELL_RETRY_DELAY),
            ledger_retry_delay: ledger::RETRY_DELAY,
            shutdown,
            metrics: Metrics::new(),
            webhook: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_webhook(mut self, webhook: Option<DiscordWebhook>) -> Self {
        self.webhook = webhook;
        self
    }

    pub fn with_ledger_retry_delay(mut self, delay: Duration) -> Self {
        self.ledger_retry_delay = delay;
        self
    }

    /// Sell `token_quantity` of `mint` and record the terminal outcome
    pub async fn exit(
        &self,
        mint: &str,
        token_quantity: Decimal,
        trigger: &ExitTrigger,
    ) -> Result<ExitOutcome, ExitError> {
        info!(
            "[Exit] {} {}: selling {} tokens ({})",
            trigger.label(),
            mint,
            token_quantity,
            trigger.reason()
        );

        let api = self.trade_api.as_ref();
        let operation = format!("sell {}", mint);
        let max_attempts = self.retry.max_attempts();
        let sell = with_retry(self.clock.as_ref(), &self.retry, &operation, |attempt| {
            debug!("[Exit] Sell attempt {}/{} for {}", attempt, max_attempts, mint);
            api.sell(mint, token_quantity)
        });

        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                warn!("[Exit] Shutdown during sell of {}, position left open", mint);
                return Err(ExitError::Shutdown { mint: mint.to_string() });
            }
            result = sell => result,
        };

        let outcome = match result {
            Ok(receipt) => {
                let exit_price = exit_price(&receipt, token_quantity, trigger.price());
                ExitOutcome::Closed {
                    proceeds: receipt.proceeds,
                    txid: receipt.txid,
                    exit_price,
                }
            }
            Err(exhausted) => ExitOutcome::Failed {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error.to_string(),
            },
        };

        self.persist(mint, &outcome).await?;

        match &outcome {
            ExitOutcome::Closed {
                proceeds,
                txid,
                exit_price,
            } => {
                self.metrics.inc_exits_closed();
                info!(
                    "[Exit] {} closed: {} SOL at {} (tx {})",
                    mint, proceeds, exit_price, txid
                );
            }
            ExitOutcome::Failed {
                attempts,
                last_error,
            } => {
                self.metrics.inc_exits_failed();
                error!(
                    "[Exit] {} FAILED after {} attempts: {}. Manual intervention required",
                    mint, attempts, last_error
                );
            }
        }

        if let Some(webhook) = &self.webhook {
            webhook.send_exit_alert(mint, trigger, &outcome).await;
        }

        Ok(outcome)
    }

    /// Write the outcome, retrying failed writes until it lands or shutdown
    async fn persist(&self, mint: &str, outcome: &ExitOutcome) -> Result<(), ExitError> {
        loop {
            let result = match outcome {
                ExitOutcome::Closed {
                    proceeds,
                    exit_price,
                    ..
                } => self.ledger.mark_closed(mint, *exit_price, *proceeds).await,
                ExitOutcome::Failed { .. } => self.ledger.mark_failed(mint).await,
            };

            match result {
                Ok(position) => {
                    debug!("[Exit] {} recorded as {}", mint, position.status);
                    return Ok(());
                }
                Err(e @ (LedgerError::NotOpen(_) | LedgerError::NotFound(_))) => {
                    // Someone else settled this mint while we were selling
                    warn!("[Exit] Outcome for {} not recorded: {}", mint, e);
                    return Ok(());
                }
                Err(LedgerError::TaskClosed) => {
                    error!("[Exit] Ledger gone, outcome for {} lost: {:?}", mint, outcome);
                    return Err(ExitError::Ledger {
                        mint: mint.to_string(),
                        source: LedgerError::TaskClosed,
                    });
                }
                Err(e) => {
                    self.metrics.inc_ledger_write_failures();
                    error!(
                        "[Exit] Failed to record outcome for {}: {}. Retrying in {:?}",
                        mint, e, self.ledger_retry_delay
                    );
                    if !sleep_or_cancel(self.clock.as_ref(), &self.shutdown, self.ledger_retry_delay).await {
                        error!("[Exit] Shutdown before outcome for {} was recorded: {:?}", mint, outcome);
                        return Err(ExitError::Shutdown { mint: mint.to_string() });
                    }
                }
            }
        }
    }
}

/// Per-token exit price: the reported price, else proceeds / quantity,
/// else the price that fired the trigger
fn exit_price(receipt: &SellReceipt, quantity: Decimal, trigger_price: Decimal) -> Decimal {
    receipt
        .price
        .or_else(|| receipt.proceeds.checked_div(quantity))
        .unwrap_or(trigger_price)
}
