//! Moonshot TP/SL Exit Engine
//!
//! Watches open Moonshot token positions recorded in a JSON ledger and sells
//! them through a trade API once the price crosses a take-profit or
//! stop-loss threshold relative to the entry price.
//!
//! The monitor loop re-prices every open position in ledger order. Exits are
//! retried a bounded number of times; a position that cannot be sold is
//! marked failed and left for the operator.

pub mod config;
pub mod ledger;
pub mod services;
pub mod types;
pub mod webhook;

pub use config::Config;
pub use ledger::{JsonLedgerStore, Ledger, LedgerError, LedgerHandle};
pub use types::{Acquisition, ExitTrigger, Position, PositionStatus};
pub use webhook::DiscordWebhook;
