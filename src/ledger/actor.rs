//! Single owner of the ledger store
//!
//! Every read and mutation goes through one task, so writers inside this
//! process (the monitor and the buy command) never interleave their
//! read-modify-write cycles. The task re-loads the document right before each
//! mutation, which narrows the window against writers in other processes
//! without closing it.

use super::{JsonLedgerStore, Ledger, LedgerError};
use crate::types::{Acquisition, Position};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<Result<T, LedgerError>>;

enum LedgerCommand {
    Load {
        reply: Reply<Ledger>,
    },
    RecordAcquisition {
        acquisition: Acquisition,
        reply: Reply<Position>,
    },
    RecordPrice {
        mint: String,
        price: Decimal,
        reply: Reply<Option<Position>>,
    },
    MarkClosed {
        mint: String,
        exit_price: Decimal,
        proceeds: Decimal,
        reply: Reply<Position>,
    },
    MarkFailed {
        mint: String,
        reply: Reply<Position>,
    },
}

/// Cloneable handle to the ledger task
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    /// Spawn the owning task. It stops once every handle is dropped.
    pub fn spawn(store: JsonLedgerStore) -> Self {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run_ledger_task(store, rx));
        Self { tx }
    }

    /// Fresh copy of the whole ledger
    pub async fn load(&self) -> Result<Ledger, LedgerError> {
        self.request(|reply| LedgerCommand::Load { reply }).await
    }

    /// Create, top up or re-open the position for a buy
    pub async fn record_acquisition(&self, acquisition: Acquisition) -> Result<Position, LedgerError> {
        self.request(|reply| LedgerCommand::RecordAcquisition { acquisition, reply })
            .await
    }

    /// Store the latest price of an open position.
    ///
    /// Returns the record as it is on disk now. A position that is gone or
    /// no longer open is returned (or `None`) without being rewritten.
    pub async fn record_price(&self, mint: &str, price: Decimal) -> Result<Option<Position>, LedgerError> {
        let mint = mint.to_string();
        self.request(|reply| LedgerCommand::RecordPrice { mint, price, reply })
            .await
    }

    pub async fn mark_closed(
        &self,
        mint: &str,
        exit_price: Decimal,
        proceeds: Decimal,
    ) -> Result<Position, LedgerError> {
        let mint = mint.to_string();
        self.request(|reply| LedgerCommand::MarkClosed {
            mint,
            exit_price,
            proceeds,
            reply,
        })
        .await
    }

    pub async fn mark_failed(&self, mint: &str) -> Result<Position, LedgerError> {
        let mint = mint.to_string();
        self.request(|reply| LedgerCommand::MarkFailed { mint, reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> LedgerCommand,
    ) -> Result<T, LedgerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| LedgerError::TaskClosed)?;
        reply_rx.await.map_err(|_| LedgerError::TaskClosed)?
    }
}

async fn run_ledger_task(mut store: JsonLedgerStore, mut rx: mpsc::Receiver<LedgerCommand>) {
    info!("[Ledger] Serving {}", store.path().display());

    while let Some(command) = rx.recv().await {
        match command {
            LedgerCommand::Load { reply } => {
                let _ = reply.send(store.load().await);
            }
            LedgerCommand::RecordAcquisition { acquisition, reply } => {
                let result = mutate(&mut store, |ledger| {
                    Ok((ledger.apply_acquisition(&acquisition), true))
                })
                .await;
                let _ = reply.send(result);
            }
            LedgerCommand::RecordPrice { mint, price, reply } => {
                let result = mutate(&mut store, |ledger| {
                    let changed = ledger.record_price(&mint, price);
                    Ok((ledger.get(&mint).cloned(), changed))
                })
                .await;
                let _ = reply.send(result);
            }
            LedgerCommand::MarkClosed {
                mint,
                exit_price,
                proceeds,
                reply,
            } => {
                let result = mutate(&mut store, |ledger| {
                    Ok((ledger.close(&mint, exit_price, proceeds)?, true))
                })
                .await;
                let _ = reply.send(result);
            }
            LedgerCommand::MarkFailed { mint, reply } => {
                let result = mutate(&mut store, |ledger| Ok((ledger.fail(&mint)?, true))).await;
                let _ = reply.send(result);
            }
        }
    }

    debug!("[Ledger] All handles dropped, ledger task exiting");
}

/// Re-load, apply `f`, and save if it reported a change
async fn mutate<T>(
    store: &mut JsonLedgerStore,
    f: impl FnOnce(&mut Ledger) -> Result<(T, bool), LedgerError>,
) -> Result<T, LedgerError> {
    let mut ledger = store.load().await?;
    let (value, changed) = f(&mut ledger)?;
    if changed {
        store.save(&ledger).await?;
    }
    Ok(value)
}
