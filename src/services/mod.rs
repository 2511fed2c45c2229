//! Background services for the exit engine

pub mod clock;
pub mod exit_executor;
pub mod exit_policy;
pub mod metrics;
pub mod oracle;
pub mod position_monitor;
pub mod retry;
pub mod trade_api;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, TokioClock};
pub use exit_executor::{ExitError, ExitExecutor, ExitOutcome};
pub use exit_policy::{decide, ExitDecision};
pub use metrics::{Metrics, MetricsSnapshot};
pub use oracle::{MoonshotPriceClient, OracleError, PriceOracle};
pub use position_monitor::{MonitorSettings, PassSummary, PositionMonitor};
pub use retry::RetryConfig;
pub use trade_api::{BuyReceipt, SellReceipt, SolanaApisClient, TradeApi, TradeApiError, TradeCredentials};
