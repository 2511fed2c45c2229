//! JSON file backing for the ledger

use super::{Ledger, LedgerError};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Reads and atomically rewrites the ledger document
#[derive(Debug)]
pub struct JsonLedgerStore {
    path: PathBuf,
    /// Set once a document has been read or written. After that a missing
    /// or empty file is no longer "first startup".
    seen_document: bool,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen_document: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full ledger.
    ///
    /// A missing or empty file yields an empty ledger only until the first
    /// document has been seen. A malformed document is always
    /// [`LedgerError::Unavailable`].
    pub async fn load(&mut self) -> Result<Ledger, LedgerError> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return self.empty_or_unavailable("file is missing");
            }
            Err(e) => return Err(self.unavailable(e.to_string())),
        };

        if data.trim().is_empty() {
            return self.empty_or_unavailable("file is empty");
        }

        let ledger: Ledger = serde_json::from_str(&data)
            .map_err(|e| self.unavailable(format!("malformed document: {}", e)))?;

        self.seen_document = true;
        debug!("[Ledger] Loaded {} positions from {}", ledger.len(), self.path.display());
        Ok(ledger)
    }

    /// Write the full ledger via temp file + rename so readers never see a
    /// partial document.
    pub async fn save(&mut self, ledger: &Ledger) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(ledger).map_err(|e| self.write_error(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        let temp_path = self.temp_path();
        if let Err(e) = write_synced(&temp_path, json.as_bytes()).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(self.write_error(e));
        }

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(self.write_error(e));
        }

        self.seen_document = true;
        debug!("[Ledger] Saved {} positions to {}", ledger.len(), self.path.display());
        Ok(())
    }

    fn empty_or_unavailable(&self, reason: &str) -> Result<Ledger, LedgerError> {
        if self.seen_document {
            warn!("[Ledger] {} ({}), waiting for records", self.path.display(), reason);
            Err(self.unavailable(reason.to_string()))
        } else {
            debug!("[Ledger] {} ({}), starting with no positions", self.path.display(), reason);
            Ok(Ledger::new())
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("ledger"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn unavailable(&self, reason: String) -> LedgerError {
        LedgerError::Unavailable {
            path: self.path.clone(),
            reason,
        }
    }

    fn write_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Acquisition, PositionStatus};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.apply_acquisition(&Acquisition {
            mint: "mintOpen".to_string(),
            base_invested: dec!(0.75),
            token_quantity: dec!(52310.123456),
            entry_price: dec!(0.00000341),
        });
        ledger.record_price("mintOpen", dec!(0.0000035));
        ledger.apply_acquisition(&Acquisition {
            mint: "mintSold".to_string(),
            base_invested: dec!(1),
            token_quantity: dec!(1000),
            entry_price: dec!(0.002),
        });
        ledger.close("mintSold", dec!(0.0025), dec!(1.25)).unwrap();
        ledger.apply_acquisition(&Acquisition {
            mint: "mintFailed".to_string(),
            base_invested: dec!(0.1),
            token_quantity: dec!(10),
            entry_price: dec!(0.123456789012345),
        });
        ledger.fail("mintFailed").unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_round_trip_preserves_every_field() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonLedgerStore::new(dir.path().join("records.json"));
        let ledger = sample_ledger();

        store.save(&ledger).await.unwrap();
        let loaded = JsonLedgerStore::new(store.path()).load().await.unwrap();

        assert_eq!(loaded, ledger);
        let sold = loaded.get("mintSold").unwrap();
        assert_eq!(sold.status, PositionStatus::Closed);
        assert_eq!(sold.exit_price, Some(dec!(0.0025)));
        assert_eq!(sold.proceeds, Some(dec!(1.25)));
    }

    #[tokio::test]
    async fn test_document_shape() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonLedgerStore::new(dir.path().join("records.json"));
        store.save(&sample_ledger()).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let open = &doc["mintOpen"];
        assert_eq!(open["mint"], "mintOpen");
        assert_eq!(open["bought_at"], "0.0000034100");
        assert_eq!(open["status"], "bought");
        for field in ["sol", "tokens", "price", "sold_at", "sold_for"] {
            assert!(open.get(field).is_some(), "missing field {}", field);
        }
        assert!(!dir.path().join("records.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_on_first_start() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonLedgerStore::new(dir.path().join("records.json"));
        assert!(store.load().await.unwrap().is_empty());

        std::fs::write(store.path(), "   \n").unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_after_first_document_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonLedgerStore::new(dir.path().join("records.json"));
        store.save(&sample_ledger()).await.unwrap();

        std::fs::write(store.path(), "").unwrap();
        assert!(store.load().await.unwrap_err().is_unavailable());

        std::fs::remove_file(store.path()).unwrap();
        assert!(store.load().await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_malformed_document_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, r#"{"mintA": {"sol": "1", "tok"#).unwrap();

        let mut store = JsonLedgerStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("malformed"));
    }

    #[tokio::test]
    async fn test_save_failure_reports_write_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let mut store = JsonLedgerStore::new(blocker.join("records.json"));
        let err = store.save(&sample_ledger()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Write { .. }));
    }
}
