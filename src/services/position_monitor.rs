//! Position Monitor - re-prices open positions and fires exits
//!
//! One cooperative loop. Each pass loads the ledger (waiting out an
//! unavailable document), then walks the open positions in ledger order:
//! fetch price, record it, evaluate, exit if triggered, pause. Nothing runs
//! concurrently within a pass and passes never overlap.

use super::clock::{sleep_or_cancel, Clock};
use super::exit_executor::{ExitError, ExitExecutor};
use super::exit_policy::{decide, thresholds, trigger_for};
use super::metrics::Metrics;
use super::oracle::PriceOracle;
use crate::ledger::{self, Ledger, LedgerHandle};
use crate::types::Position;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Thresholds and pacing for the monitor
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Percent above entry that triggers a take profit
    pub take_profit_percent: Decimal,
    /// Percent below entry that triggers a stop loss
    pub stop_loss_percent: Decimal,
    /// Pause after each mint
    pub price_check_delay: Duration,
    /// Wait before re-loading an unavailable ledger
    pub ledger_retry_delay: Duration,
}

impl MonitorSettings {
    pub fn new(take_profit_percent: Decimal, stop_loss_percent: Decimal, price_check_delay: Duration) -> Self {
        Self {
            take_profit_percent,
            stop_loss_percent,
            price_check_delay,
            ledger_retry_delay: ledger::RETRY_DELAY,
        }
    }
}

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Open positions that were priced and evaluated
    pub checked: usize,
    /// Open positions skipped (no price, or settled mid-pass)
    pub skipped: usize,
    pub closed: usize,
    pub failed: usize,
}

pub struct PositionMonitor {
    ledger: LedgerHandle,
    oracle: Arc<dyn PriceOracle>,
    executor: ExitExecutor,
    clock: Arc<dyn Clock>,
    settings: MonitorSettings,
    shutdown: CancellationToken,
    metrics: Metrics,
}

impl PositionMonitor {
    pub fn new(
        ledger: LedgerHandle,
        oracle: Arc<dyn PriceOracle>,
        executor: ExitExecutor,
        clock: Arc<dyn Clock>,
        settings: MonitorSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            oracle,
            executor,
            clock,
            settings,
            shutdown,
            metrics: Metrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run passes until the shutdown token is cancelled
    pub async fn run(&self) {
        info!(
            "[Monitor] Started (TP +{}%, SL -{}%, {:?} between mints)",
            self.settings.take_profit_percent, self.settings.stop_loss_percent, self.settings.price_check_delay
        );

        while let Some(summary) = self.run_pass().await {
            debug!(
                "[Monitor] Pass done: {} checked, {} skipped, {} closed, {} failed",
                summary.checked, summary.skipped, summary.closed, summary.failed
            );
        }

        info!("[Monitor] Stopped");
    }

    /// One full pass over the ledger. `None` if shutdown cut it short.
    pub async fn run_pass(&self) -> Option<PassSummary> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let ledger = self.load_ledger().await?;
        let open: Vec<Position> = ledger.open_positions().cloned().collect();
        let mut summary = PassSummary::default();

        if open.is_empty() {
            debug!("[Monitor] No open positions");
            if !self.pause(self.settings.price_check_delay).await {
                return None;
            }
        }

        for position in &open {
            if self.shutdown.is_cancelled() {
                return None;
            }
            self.check_position(position, &mut summary).await?;
            if !self.pause(self.settings.price_check_delay).await {
                return None;
            }
        }

        self.metrics.inc_passes();
        Some(summary)
    }

    /// Load the ledger, waiting out unavailability
    async fn load_ledger(&self) -> Option<Ledger> {
        loop {
            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                result = self.ledger.load() => result,
            };

            match result {
                Ok(ledger) => return Some(ledger),
                Err(e) => {
                    warn!(
                        "[Monitor] Ledger unavailable: {}. Retrying in {:?}",
                        e, self.settings.ledger_retry_delay
                    );
                    if !self.pause(self.settings.ledger_retry_delay).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Price, record, evaluate and possibly exit one position.
    /// `None` if shutdown interrupted it.
    async fn check_position(&self, position: &Position, summary: &mut PassSummary) -> Option<()> {
        let mint = position.mint.as_str();

        let fetched = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return None,
            result = self.oracle.fetch_price(mint) => result,
        };

        let price = match fetched {
            Ok(price) => {
                self.metrics.inc_prices_fetched();
                price
            }
            Err(e) => {
                self.metrics.inc_price_failures();
                warn!("[Monitor] Skipping {} this pass: {}", mint, e);
                summary.skipped += 1;
                return Some(());
            }
        };

        let current = match self.ledger.record_price(mint, price).await {
            Ok(Some(fresh)) if fresh.is_open() => fresh,
            Ok(Some(fresh)) => {
                debug!("[Monitor] {} is now {}, skipping", mint, fresh.status);
                summary.skipped += 1;
                return Some(());
            }
            Ok(None) => {
                warn!("[Monitor] {} disappeared from the ledger, skipping", mint);
                summary.skipped += 1;
                return Some(());
            }
            Err(e) => {
                self.metrics.inc_ledger_write_failures();
                warn!("[Monitor] Could not record price for {}: {}", mint, e);
                position.clone()
            }
        };

        summary.checked += 1;

        if let (None, _) | (_, None) = thresholds(
            current.entry_price,
            self.settings.take_profit_percent,
            self.settings.stop_loss_percent,
        ) {
            warn!(
                "[Monitor] {} entry {} puts a TP/SL level out of range; that level cannot fire",
                mint, current.entry_price
            );
        }

        let decision = decide(
            current.entry_price,
            price,
            self.settings.take_profit_percent,
            self.settings.stop_loss_percent,
        );
        debug!(
            "[Monitor] {} price={} entry={} pnl={:.2}% -> {:?}",
            mint,
            price,
            current.entry_price,
            current.pnl_percent(price),
            decision
        );

        let Some(trigger) = trigger_for(decision, current.entry_price, price) else {
            return Some(());
        };

        match self.executor.exit(mint, current.token_quantity, &trigger).await {
            Ok(outcome) if outcome.is_closed() => summary.closed += 1,
            Ok(_) => summary.failed += 1,
            Err(ExitError::Shutdown { .. }) => return None,
            Err(e) => error!("[Monitor] {}", e),
        }

        Some(())
    }

    async fn pause(&self, duration: Duration) -> bool {
        sleep_or_cancel(self.clock.as_ref(), &self.shutdown, duration).await
    }
}
