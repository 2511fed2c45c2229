//! Core types for the exit engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum number of fractional digits written for `bought_at`.
pub const ENTRY_PRICE_SCALE: u32 = 10;

/// Lifecycle status of a position
///
/// The document encodings (`bought`, `sold`, `failed`) are the ones the
/// acquisition flow writes, so records from either side stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    #[serde(rename = "bought")]
    Open,
    #[serde(rename = "sold")]
    Closed,
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Open => write!(f, "OPEN"),
            PositionStatus::Closed => write!(f, "CLOSED"),
            PositionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// A held token tracked in the ledger, keyed by mint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Filled from the ledger key when a record omits it
    #[serde(default)]
    pub mint: String,
    /// SOL committed to the position
    #[serde(rename = "sol")]
    pub base_invested: Decimal,
    /// Token quantity held
    #[serde(rename = "tokens")]
    pub token_quantity: Decimal,
    /// USD price per token at acquisition
    #[serde(rename = "bought_at", with = "fixed_point")]
    pub entry_price: Decimal,
    /// Most recent price sample from the monitor
    #[serde(rename = "price", default)]
    pub last_observed_price: Option<Decimal>,
    pub status: PositionStatus,
    /// Exit price per token, set once the position leaves `Open`
    #[serde(rename = "sold_at", default)]
    pub exit_price: Option<Decimal>,
    /// SOL received on exit
    #[serde(rename = "sold_for", default)]
    pub proceeds: Option<Decimal>,
}

impl Position {
    /// Create a fresh open position from an acquisition
    pub fn from_acquisition(acquisition: &Acquisition) -> Self {
        Self {
            mint: acquisition.mint.clone(),
            base_invested: acquisition.base_invested,
            token_quantity: acquisition.token_quantity,
            entry_price: acquisition.entry_price,
            last_observed_price: None,
            status: PositionStatus::Open,
            exit_price: None,
            proceeds: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// PnL of `price` against the entry price, as a fraction (0.10 = +10%)
    ///
    /// Zero when the entry price is zero or the result does not fit a `Decimal`.
    pub fn pnl_fraction(&self, price: Decimal) -> Decimal {
        price
            .checked_sub(self.entry_price)
            .and_then(|diff| diff.checked_div(self.entry_price))
            .unwrap_or(Decimal::ZERO)
    }

    /// [`Self::pnl_fraction`] scaled to percent
    pub fn pnl_percent(&self, price: Decimal) -> Decimal {
        self.pnl_fraction(price)
            .checked_mul(Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::ZERO)
    }
}

/// A buy reported by the acquisition flow
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub mint: String,
    pub base_invested: Decimal,
    pub token_quantity: Decimal,
    pub entry_price: Decimal,
}

/// Why a position is being exited
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ExitTrigger {
    TakeProfit { price: Decimal, pnl_percent: Decimal },
    StopLoss { price: Decimal, pnl_percent: Decimal },
}

impl ExitTrigger {
    /// Get the action name for logging
    pub fn action_name(&self) -> &'static str {
        match self {
            ExitTrigger::TakeProfit { .. } => "take_profit",
            ExitTrigger::StopLoss { .. } => "stop_loss",
        }
    }

    /// Short label used in alerts ("TP" / "SL")
    pub fn label(&self) -> &'static str {
        match self {
            ExitTrigger::TakeProfit { .. } => "TP",
            ExitTrigger::StopLoss { .. } => "SL",
        }
    }

    /// Get the reason string for logging
    pub fn reason(&self) -> String {
        match self {
            ExitTrigger::TakeProfit { pnl_percent, .. } => {
                format!("Take profit triggered at +{:.1}%", pnl_percent)
            }
            ExitTrigger::StopLoss { pnl_percent, .. } => {
                format!("Stop loss triggered at {:.1}%", pnl_percent)
            }
        }
    }

    /// Price that fired the trigger
    pub fn price(&self) -> Decimal {
        match self {
            ExitTrigger::TakeProfit { price, .. } => *price,
            ExitTrigger::StopLoss { price, .. } => *price,
        }
    }
}

/// `bought_at` is written as a fixed-point string with at least
/// [`ENTRY_PRICE_SCALE`] fractional digits and read back from either a
/// string or a JSON number.
mod fixed_point {
    use super::ENTRY_PRICE_SCALE;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let scale = value.scale().max(ENTRY_PRICE_SCALE) as usize;
        serializer.serialize_str(&format!("{:.*}", scale, value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        <Decimal as Deserialize>::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::from_acquisition(&Acquisition {
            mint: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string(),
            base_invested: dec!(0.5),
            token_quantity: dec!(125000),
            entry_price: dec!(0.0000123),
        })
    }

    #[test]
    fn test_entry_price_written_fixed_point() {
        let json = serde_json::to_value(position()).unwrap();
        assert_eq!(json["bought_at"], "0.0000123000");
        assert_eq!(json["status"], "bought");
        assert!(json["sold_for"].is_null());
    }

    #[test]
    fn test_entry_price_keeps_extra_precision() {
        let mut p = position();
        p.entry_price = dec!(0.000000012345678912);
        let json = serde_json::to_string(&p).unwrap();
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entry_price, p.entry_price);
    }

    #[test]
    fn test_reads_numeric_fields() {
        let json = r#"{
            "mint": "abc",
            "sol": 0.25,
            "tokens": 1000,
            "bought_at": "0.0001000000",
            "price": 0.00012,
            "status": "sold",
            "sold_for": 0.5
        }"#;
        let p: Position = serde_json::from_str(json).unwrap();
        assert_eq!(p.base_invested, dec!(0.25));
        assert_eq!(p.token_quantity, dec!(1000));
        assert_eq!(p.entry_price, dec!(0.0001));
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.proceeds, Some(dec!(0.5)));
        assert_eq!(p.exit_price, None);
    }

    #[test]
    fn test_reads_entry_price_as_number_or_string() {
        let from_number: Position = serde_json::from_str(
            r#"{"sol": 0.1, "tokens": 10, "bought_at": 0.00042, "status": "bought"}"#,
        )
        .unwrap();
        let from_string: Position = serde_json::from_str(
            r#"{"sol": 0.1, "tokens": 10, "bought_at": "0.0004200000", "status": "bought"}"#,
        )
        .unwrap();
        assert_eq!(from_number.entry_price, dec!(0.00042));
        assert_eq!(from_string.entry_price, dec!(0.00042));
        assert!(from_number.is_open());
    }

    #[test]
    fn test_pnl_fraction() {
        let p = position();
        assert_eq!(p.pnl_fraction(dec!(0.00001353)), dec!(0.1));
        assert_eq!(p.pnl_fraction(dec!(0.0000123)), Decimal::ZERO);
        assert_eq!(p.pnl_percent(dec!(0.00001353)), dec!(10));
    }

    #[test]
    fn test_pnl_out_of_range_is_zero() {
        let mut p = position();
        p.entry_price = dec!(0.0000000000000000000000000001);
        assert_eq!(p.pnl_fraction(Decimal::MAX), Decimal::ZERO);
        assert_eq!(p.pnl_percent(Decimal::MAX), Decimal::ZERO);

        p.entry_price = Decimal::MIN;
        assert_eq!(p.pnl_fraction(Decimal::MAX), Decimal::ZERO);

        p.entry_price = Decimal::ZERO;
        assert_eq!(p.pnl_fraction(dec!(1)), Decimal::ZERO);
    }

    #[test]
    fn test_trigger_reason() {
        let trigger = ExitTrigger::StopLoss {
            price: dec!(0.9),
            pnl_percent: dec!(-10),
        };
        assert_eq!(trigger.action_name(), "stop_loss");
        assert_eq!(trigger.label(), "SL");
        assert_eq!(trigger.reason(), "Stop loss triggered at -10.0%");
    }
}
