//! Price oracle client
//!
//! Fetches the current USD price of a mint from the Moonshot token API.
//! Failed lookups are retried a fixed number of times; after that the mint
//! is reported unavailable and the monitor skips it for the pass.

use super::clock::Clock;
use super::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Attempts per lookup, first try included
pub const PRICE_FETCH_ATTEMPTS: u32 = 3;
/// Delay between lookup attempts
pub const PRICE_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("price request failed: {0}")]
    Transport(String),

    #[error("price API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid price response: {0}")]
    Parse(String),

    #[error("price for {mint} unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        mint: String,
        attempts: u32,
        last_error: String,
    },
}

/// Current USD price lookup
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn fetch_price(&self, mint: &str) -> Result<Decimal, OracleError>;
}

/// Raw response from the token endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPriceResponse {
    #[serde(default)]
    price_usd: Option<Decimal>,
}

/// HTTP client for `GET {base_url}{mint}`
pub struct MoonshotPriceClient {
    client: Client,
    base_url: String,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
}

impl MoonshotPriceClient {
    pub fn new(base_url: &str, timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            clock,
            retry: RetryConfig::with_total_attempts(PRICE_FETCH_ATTEMPTS, PRICE_RETRY_DELAY),
        })
    }

    /// Override the default retry budget
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, mint: &str) -> Result<Decimal, OracleError> {
        let url = format!("{}{}", self.base_url, mint);
        debug!("[Oracle] GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let parsed: TokenPriceResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        match parsed.price_usd {
            // A zero price is a real quote for a token with no liquidity left
            Some(price) if price >= Decimal::ZERO => Ok(price),
            Some(price) => Err(OracleError::Parse(format!("negative price {}", price))),
            None => Err(OracleError::Parse("response missing priceUsd".to_string())),
        }
    }
}

#[async_trait]
impl PriceOracle for MoonshotPriceClient {
    async fn fetch_price(&self, mint: &str) -> Result<Decimal, OracleError> {
        let operation = format!("price fetch for {}", mint);
        with_retry(self.clock.as_ref(), &self.retry, &operation, |_| self.fetch_once(mint))
            .await
            .map_err(|exhausted| {
                warn!(
                    "[Oracle] Price for {} unavailable after {} attempts: {}",
                    mint, exhausted.attempts, exhausted.last_error
                );
                OracleError::Unavailable {
                    mint: mint.to_string(),
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error.to_string(),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{HttpStub, RecordingClock};
    use rust_decimal_macros::dec;

    fn client(stub: &HttpStub, clock: Arc<RecordingClock>) -> MoonshotPriceClient {
        MoonshotPriceClient::new(&format!("{}/token/v1/solana/", stub.base_url), Duration::from_secs(5), clock)
            .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_price_string_field() {
        let stub = HttpStub::start(vec![(200, r#"{"priceUsd":"0.00004512","fdv":"45000"}"#.to_string())]).await;
        let clock = Arc::new(RecordingClock::new());

        let price = client(&stub, clock.clone()).fetch_price("mintA").await.unwrap();

        assert_eq!(price, dec!(0.00004512));
        assert!(stub.requests()[0].starts_with("GET /token/v1/solana/mintA"));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_price_numeric_field() {
        let stub = HttpStub::start(vec![(200, r#"{"priceUsd":0.5}"#.to_string())]).await;
        let price = client(&stub, Arc::new(RecordingClock::new()))
            .fetch_price("mintA")
            .await
            .unwrap();
        assert_eq!(price, dec!(0.5));
    }

    #[tokio::test]
    async fn test_zero_price_is_a_quote() {
        let stub = HttpStub::start(vec![(200, r#"{"priceUsd":"0"}"#.to_string())]).await;
        let clock = Arc::new(RecordingClock::new());

        let price = client(&stub, clock.clone()).fetch_price("mintA").await.unwrap();

        assert_eq!(price, Decimal::ZERO);
        assert_eq!(stub.requests().len(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_negative_price_is_retried() {
        let stub = HttpStub::start(vec![
            (200, r#"{"priceUsd":"-0.1"}"#.to_string()),
            (200, r#"{"priceUsd":"0.2"}"#.to_string()),
        ])
        .await;
        let clock = Arc::new(RecordingClock::new());

        let price = client(&stub, clock.clone()).fetch_price("mintA").await.unwrap();

        assert_eq!(price, dec!(0.2));
        assert_eq!(stub.requests().len(), 2);
        assert_eq!(clock.sleeps(), vec![PRICE_RETRY_DELAY]);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let stub = HttpStub::start(vec![
            (502, "bad gateway".to_string()),
            (200, r#"{"pairs":[]}"#.to_string()),
            (200, r#"{"priceUsd":"1.25"}"#.to_string()),
        ])
        .await;
        let clock = Arc::new(RecordingClock::new());

        let price = client(&stub, clock.clone()).fetch_price("mintA").await.unwrap();

        assert_eq!(price, dec!(1.25));
        assert_eq!(stub.requests().len(), 3);
        assert_eq!(clock.sleeps(), vec![PRICE_RETRY_DELAY; 2]);
    }

    #[tokio::test]
    async fn test_unavailable_after_three_attempts() {
        let stub = HttpStub::start(vec![(500, "down".to_string())]).await;
        let clock = Arc::new(RecordingClock::new());

        let err = client(&stub, clock.clone()).fetch_price("mintA").await.unwrap_err();

        assert!(matches!(err, OracleError::Unavailable { attempts: 3, ref mint, .. } if mint == "mintA"));
        assert_eq!(stub.requests().len(), 3);
        assert_eq!(clock.sleeps().len(), 2);
    }
}
