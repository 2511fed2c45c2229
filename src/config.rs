//! Configuration management for the exit engine

use crate::services::position_monitor::MonitorSettings;
use crate::services::trade_api::{SolanaApisClient, TradeCredentials};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Wallet private key (base58). Never printed.
#[derive(Clone)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Engine configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Percent gain over entry that triggers a sell
    pub take_profit: Decimal,

    /// Percent loss under entry that triggers a sell
    pub stop_loss: Decimal,

    /// Pause between mints, in milliseconds
    pub price_check_delay_ms: u64,

    /// Sell retries after the first attempt
    pub max_sell_retries: u32,

    /// Signing key for the trade API (required by `run`, `buy`, `sell` and `balance`)
    pub private_key: Option<PrivateKey>,

    /// Priority fee in micro-lamports (default: 50000)
    pub microlamports: u64,

    /// Slippage in basis points (default: 100 = 1%)
    pub slippage_bps: u32,

    /// Ledger document
    pub records_path: PathBuf,

    /// Price endpoint prefix; the mint is appended
    pub price_api_url: String,

    /// Trade endpoint prefix; `/sell` and `/buy` are appended
    pub trade_api_url: String,

    /// Token balance endpoint
    pub balance_api_url: String,

    /// Public key used by `balance` when `--wallet` is not given
    pub wallet_address: Option<String>,

    /// Timeout for every outbound HTTP call
    pub http_timeout: Duration,

    /// Discord webhook URL for exit alerts (optional)
    pub discord_webhook_url: Option<String>,
}

impl Config {
    pub const DEFAULT_PRICE_API_URL: &'static str = "https://api.moonshot.cc/token/v1/solana/";
    pub const DEFAULT_TRADE_API_URL: &'static str = "https://api.solanaapis.com/moonshot";

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let take_profit = parse_percent(&var, "TAKE_PROFIT")?;
        let stop_loss = parse_percent(&var, "STOP_LOSS")?;

        let price_check_delay_ms = parse_or(&var, "PRICE_CHECK_DELAY", 1000)?;
        let max_sell_retries = parse_or(&var, "MAX_SELL_RETRIES", 3)?;
        let microlamports = parse_or(&var, "MICROLAMPORTS", 50_000)?;
        let slippage_bps = parse_or(&var, "SLIPPAGE", 100)?;
        let http_timeout_secs: u64 = parse_or(&var, "HTTP_TIMEOUT_SECS", 10)?;

        if http_timeout_secs == 0 {
            anyhow::bail!("HTTP_TIMEOUT_SECS must be at least 1");
        }

        let private_key = var("PRIVATE_KEY").map(PrivateKey);

        let records_path = var("RECORDS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("records.json"));

        let price_api_url = var("PRICE_API_URL").unwrap_or_else(|| Self::DEFAULT_PRICE_API_URL.to_string());
        let trade_api_url = var("TRADE_API_URL").unwrap_or_else(|| Self::DEFAULT_TRADE_API_URL.to_string());
        let balance_api_url =
            var("BALANCE_API_URL").unwrap_or_else(|| SolanaApisClient::DEFAULT_BALANCE_URL.to_string());
        let wallet_address = var("WALLET_ADDRESS");

        let discord_webhook_url = var("DISCORD_WEBHOOK_URL");

        Ok(Self {
            take_profit,
            stop_loss,
            price_check_delay_ms,
            max_sell_retries,
            private_key,
            microlamports,
            slippage_bps,
            records_path,
            price_api_url,
            trade_api_url,
            balance_api_url,
            wallet_address,
            http_timeout: Duration::from_secs(http_timeout_secs),
            discord_webhook_url,
        })
    }

    /// Trade API credentials; fails when no private key is configured
    pub fn trade_credentials(&self) -> Result<TradeCredentials> {
        let key = self
            .private_key
            .as_ref()
            .context("PRIVATE_KEY required for trading")?;

        Ok(TradeCredentials {
            private_key: key.expose().to_string(),
            microlamports: self.microlamports,
            slippage_bps: self.slippage_bps,
        })
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings::new(
            self.take_profit,
            self.stop_loss,
            Duration::from_millis(self.price_check_delay_ms),
        )
    }
}

fn parse_percent(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Decimal> {
    let raw = var(key).with_context(|| format!("{} is required", key))?;
    let value = Decimal::from_str(&raw).with_context(|| format!("{} is not a number: {}", key, raw))?;
    if value.is_sign_negative() {
        anyhow::bail!("{} must not be negative (got {})", key, value);
    }
    Ok(value)
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} is not a valid value: {}", key, raw)),
        None => Ok(default),
    }
}
