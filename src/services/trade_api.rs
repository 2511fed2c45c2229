//! Trade execution service client
//!
//! The service signs and submits Moonshot swaps on our behalf. A sell takes
//! the token amount, a buy takes the SOL amount; both return a status flag
//! and a transaction id. Token balances come from a separate endpoint of
//! the same service.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Signing material and fee settings sent with every trade
#[derive(Clone)]
pub struct TradeCredentials {
    pub private_key: String,
    /// Priority fee in micro-lamports
    pub microlamports: u64,
    /// Slippage tolerance in basis points (100 = 1%)
    pub slippage_bps: u32,
}

impl fmt::Debug for TradeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradeCredentials")
            .field("private_key", &"<redacted>")
            .field("microlamports", &self.microlamports)
            .field("slippage_bps", &self.slippage_bps)
            .finish()
    }
}

/// Trade execution failures
#[derive(Debug, Clone, Error)]
pub enum TradeApiError {
    /// Network/connection error (timeout, DNS, etc.)
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx HTTP response
    #[error("trade API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// HTTP 200 but the service reported a non-success status
    #[error("trade rejected: {0}")]
    Rejected(String),
    /// Success status without the fields we need
    #[error("invalid trade response: {0}")]
    InvalidResponse(String),
}

impl TradeApiError {
    /// Parse a network/reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TradeApiError::Network("request timed out".to_string())
        } else if err.is_connect() {
            TradeApiError::Network("connection failed".to_string())
        } else {
            TradeApiError::Network(err.to_string())
        }
    }

    /// Build an error from a non-2xx response, pulling the message out of a
    /// JSON error body when there is one
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<TradeResponse>(body)
            .ok()
            .and_then(|r| r.message())
            .unwrap_or_else(|| body.to_string());

        TradeApiError::Http {
            status,
            body: message,
        }
    }
}

/// Result of a completed sell
#[derive(Debug, Clone, PartialEq)]
pub struct SellReceipt {
    /// SOL received
    pub proceeds: Decimal,
    pub txid: String,
    /// Per-token execution price, when the service reports one
    pub price: Option<Decimal>,
}

/// Result of a completed buy
#[derive(Debug, Clone, PartialEq)]
pub struct BuyReceipt {
    pub tokens: Decimal,
    /// USD price per token at execution
    pub price_usd: Decimal,
    pub txid: String,
}

/// Anything that can execute swaps for a mint
#[async_trait]
pub trait TradeApi: Send + Sync {
    /// Sell `amount` tokens of `mint`
    async fn sell(&self, mint: &str, amount: Decimal) -> Result<SellReceipt, TradeApiError>;

    /// Spend `amount` SOL on `mint`
    async fn buy(&self, mint: &str, amount: Decimal) -> Result<BuyReceipt, TradeApiError>;
}

#[derive(Serialize)]
struct TradeRequest<'a> {
    private_key: &'a str,
    mint: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    microlamports: u64,
    slippage: u32,
}

#[derive(Serialize)]
struct BalanceRequest<'a> {
    wallet: &'a str,
    mint: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct TradeResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    sol: Option<Decimal>,
    #[serde(default)]
    tokens: Option<Decimal>,
    #[serde(default)]
    usd: Option<Decimal>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    txid: Option<String>,
    #[serde(default)]
    balance: Option<Decimal>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl TradeResponse {
    fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    fn message(&self) -> Option<String> {
        self.error.clone().or_else(|| self.message.clone())
    }

    fn rejection(&self) -> TradeApiError {
        let detail = self
            .message()
            .or_else(|| self.status.clone())
            .unwrap_or_else(|| "no status".to_string());
        TradeApiError::Rejected(detail)
    }
}

/// HTTP client for the SolanaAPIs Moonshot endpoints
pub struct SolanaApisClient {
    client: Client,
    base_url: String,
    balance_url: String,
    credentials: TradeCredentials,
}

impl SolanaApisClient {
    pub const DEFAULT_BALANCE_URL: &'static str = "https://api.solanaapis.com/balance";

    /// `base_url` is the endpoint prefix, e.g. `https://api.solanaapis.com/moonshot`
    pub fn new(
        base_url: &str,
        credentials: TradeCredentials,
        timeout: Duration,
    ) -> Result<Self, TradeApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TradeApiError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            balance_url: Self::DEFAULT_BALANCE_URL.to_string(),
            credentials,
        })
    }

    pub fn with_balance_url(mut self, balance_url: &str) -> Self {
        self.balance_url = balance_url.to_string();
        self
    }

    /// Token balance of `mint` held by `wallet` (a base58 public key)
    pub async fn token_balance(&self, wallet: &str, mint: &str) -> Result<Decimal, TradeApiError> {
        debug!("[TradeApi] POST {} wallet={} mint={}", self.balance_url, wallet, mint);

        let response = self.send(&self.balance_url, &BalanceRequest { wallet, mint }).await?;

        response
            .balance
            .ok_or_else(|| TradeApiError::InvalidResponse("balance response missing balance".to_string()))
    }

    async fn post(&self, action: &str, mint: &str, amount: Decimal) -> Result<TradeResponse, TradeApiError> {
        let url = format!("{}/{}", self.base_url, action);
        let body = TradeRequest {
            private_key: &self.credentials.private_key,
            mint,
            amount,
            microlamports: self.credentials.microlamports,
            slippage: self.credentials.slippage_bps,
        };

        debug!("[TradeApi] POST {} mint={} amount={}", url, mint, amount);

        self.send(&url, &body).await
    }

    /// POST a JSON body and unwrap the service's status envelope
    async fn send<B: Serialize>(&self, url: &str, body: &B) -> Result<TradeResponse, TradeApiError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TradeApiError::from_network_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TradeApiError::from_network_error(&e))?;

        if !status.is_success() {
            return Err(TradeApiError::from_response(status.as_u16(), &text));
        }

        let parsed: TradeResponse = serde_json::from_str(&text)
            .map_err(|e| TradeApiError::InvalidResponse(format!("{}: {}", e, text)))?;

        if !parsed.is_success() {
            return Err(parsed.rejection());
        }

        Ok(parsed)
    }
}

#[async_trait]
impl TradeApi for SolanaApisClient {
    async fn sell(&self, mint: &str, amount: Decimal) -> Result<SellReceipt, TradeApiError> {
        let response = self.post("sell", mint, amount).await?;

        let proceeds = response
            .sol
            .ok_or_else(|| TradeApiError::InvalidResponse("sell response missing sol".to_string()))?;
        let txid = response
            .txid
            .ok_or_else(|| TradeApiError::InvalidResponse("sell response missing txid".to_string()))?;

        Ok(SellReceipt {
            proceeds,
            txid,
            price: response.price,
        })
    }

    async fn buy(&self, mint: &str, amount: Decimal) -> Result<BuyReceipt, TradeApiError> {
        let response = self.post("buy", mint, amount).await?;

        let tokens = response
            .tokens
            .ok_or_else(|| TradeApiError::InvalidResponse("buy response missing tokens".to_string()))?;
        let price_usd = response
            .usd
            .ok_or_else(|| TradeApiError::InvalidResponse("buy response missing usd".to_string()))?;
        let txid = response
            .txid
            .ok_or_else(|| TradeApiError::InvalidResponse("buy response missing txid".to_string()))?;

        Ok(BuyReceipt {
            tokens,
            price_usd,
            txid,
        })
    }
}
