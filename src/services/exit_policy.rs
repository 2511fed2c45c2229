//! Take-profit / stop-loss decision
//!
//! Pure threshold checks, no I/O. Take profit is checked before stop loss,
//! so a pair of thresholds that overlap (only possible with negative
//! percentages) resolves to `TakeProfit`.
//!
//! All arithmetic is checked. A level that falls outside the `Decimal`
//! range can never be crossed by a price, so it is reported as `None` and
//! treated as unreachable.

use crate::types::ExitTrigger;
use rust_decimal::Decimal;

/// Outcome of evaluating one price sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    TakeProfit,
    StopLoss,
}

/// Take-profit and stop-loss price levels for an entry price
pub fn thresholds(
    entry_price: Decimal,
    take_profit_pct: Decimal,
    stop_loss_pct: Decimal,
) -> (Option<Decimal>, Option<Decimal>) {
    let take_profit = price_level(entry_price, take_profit_pct);
    let stop_loss = stop_loss_pct
        .checked_mul(Decimal::NEGATIVE_ONE)
        .and_then(|change| price_level(entry_price, change));
    (take_profit, stop_loss)
}

/// `entry * (1 + change_pct / 100)`, or `None` on overflow
fn price_level(entry_price: Decimal, change_pct: Decimal) -> Option<Decimal> {
    let factor = change_pct
        .checked_div(Decimal::ONE_HUNDRED)?
        .checked_add(Decimal::ONE)?;
    entry_price.checked_mul(factor)
}

pub fn decide(
    entry_price: Decimal,
    current_price: Decimal,
    take_profit_pct: Decimal,
    stop_loss_pct: Decimal,
) -> ExitDecision {
    let (take_profit, stop_loss) = thresholds(entry_price, take_profit_pct, stop_loss_pct);

    if take_profit.is_some_and(|level| current_price >= level) {
        ExitDecision::TakeProfit
    } else if stop_loss.is_some_and(|level| current_price <= level) {
        ExitDecision::StopLoss
    } else {
        ExitDecision::Hold
    }
}

/// Trigger for a non-`Hold` decision, with the PnL in percent
pub fn trigger_for(decision: ExitDecision, entry_price: Decimal, price: Decimal) -> Option<ExitTrigger> {
    let pnl_percent = price
        .checked_sub(entry_price)
        .and_then(|diff| diff.checked_div(entry_price))
        .and_then(|fraction| fraction.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO);

    match decision {
        ExitDecision::Hold => None,
        ExitDecision::TakeProfit => Some(ExitTrigger::TakeProfit { price, pnl_percent }),
        ExitDecision::StopLoss => Some(ExitTrigger::StopLoss { price, pnl_percent }),
    }
}
