//! Position ledger
//!
//! The ledger is one JSON document mapping mint -> position. It is read and
//! rewritten as a whole:
//! - [`JsonLedgerStore`] does the file I/O (atomic temp-file + rename writes)
//! - [`LedgerHandle`] funnels every mutation through a single owning task,
//!   which re-loads the document right before each read-modify-write

pub mod actor;
pub mod store;

pub use actor::LedgerHandle;
pub use store::JsonLedgerStore;

use crate::types::{Acquisition, Position, PositionStatus};
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Wait before retrying an unavailable ledger or a failed write
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Errors raised by the ledger store and its owning task
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Document missing after first use, unreadable or malformed. Transient.
    #[error("ledger at {} unavailable: {reason}", path.display())]
    Unavailable { path: PathBuf, reason: String },

    #[error("failed to write ledger to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no position recorded for mint {0}")]
    NotFound(String),

    #[error("position for mint {0} is not open")]
    NotOpen(String),

    #[error("ledger task has shut down")]
    TaskClosed,
}

impl LedgerError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LedgerError::Unavailable { .. })
    }
}

/// All positions, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    positions: Vec<Position>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, mint: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.mint == mint)
    }

    fn get_mut(&mut self, mint: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.mint == mint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    /// Open positions in document order
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter().filter(|p| p.is_open())
    }

    /// Insert or replace a record, keeping its slot if the mint exists
    pub fn upsert(&mut self, position: Position) {
        match self.get_mut(&position.mint) {
            Some(existing) => *existing = position,
            None => self.positions.push(position),
        }
    }

    /// Apply a buy to the ledger.
    ///
    /// An open position accumulates SOL and tokens; the entry price is left
    /// as it was. A closed or failed position is re-entered from scratch.
    pub fn apply_acquisition(&mut self, acquisition: &Acquisition) -> Position {
        match self.get_mut(&acquisition.mint) {
            Some(existing) if existing.is_open() => {
                existing.base_invested = existing.base_invested.saturating_add(acquisition.base_invested);
                existing.token_quantity = existing.token_quantity.saturating_add(acquisition.token_quantity);
                existing.clone()
            }
            Some(existing) => {
                *existing = Position::from_acquisition(acquisition);
                existing.clone()
            }
            None => {
                let position = Position::from_acquisition(acquisition);
                self.positions.push(position.clone());
                position
            }
        }
    }

    /// Record a price sample. Only open positions are touched; returns
    /// whether anything changed.
    pub fn record_price(&mut self, mint: &str, price: Decimal) -> bool {
        match self.get_mut(mint) {
            Some(position) if position.is_open() => {
                position.last_observed_price = Some(price);
                true
            }
            _ => false,
        }
    }

    /// Move an open position to `Closed` with its exit fields
    pub fn close(
        &mut self,
        mint: &str,
        exit_price: Decimal,
        proceeds: Decimal,
    ) -> Result<Position, LedgerError> {
        let position = self.open_mut(mint)?;
        position.status = PositionStatus::Closed;
        position.exit_price = Some(exit_price);
        position.proceeds = Some(proceeds);
        Ok(position.clone())
    }

    /// Move an open position to `Failed`
    pub fn fail(&mut self, mint: &str) -> Result<Position, LedgerError> {
        let position = self.open_mut(mint)?;
        position.status = PositionStatus::Failed;
        Ok(position.clone())
    }

    fn open_mut(&mut self, mint: &str) -> Result<&mut Position, LedgerError> {
        let position = self
            .get_mut(mint)
            .ok_or_else(|| LedgerError::NotFound(mint.to_string()))?;
        if !position.is_open() {
            return Err(LedgerError::NotOpen(mint.to_string()));
        }
        Ok(position)
    }
}

impl Serialize for Ledger {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.positions.len()))?;
        for position in &self.positions {
            map.serialize_entry(&position.mint, position)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Ledger {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LedgerVisitor;

        impl<'de> Visitor<'de> for LedgerVisitor {
            type Value = Ledger;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of mint to position")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Ledger, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut ledger = Ledger::new();
                while let Some((mint, mut position)) = access.next_entry::<String, Position>()? {
                    // The key is authoritative
                    position.mint = mint;
                    ledger.upsert(position);
                }
                Ok(ledger)
            }
        }

        deserializer.deserialize_map(LedgerVisitor)
    }
}
