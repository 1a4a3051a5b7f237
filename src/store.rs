// =============================================================================
// State Store — versioned JSON ledger with compare-and-swap writes
// =============================================================================
//
// The ledger is read at the start of a buy cycle and written back after a
// fill. Every snapshot carries a version; a write only lands if the on-disk
// version still matches the one that was read, so two overlapping cycles
// cannot silently overwrite each other.
//
// Writes go through a `.tmp` sibling and a rename. The in-process mutex
// serializes read-compare-write; it does not protect against a second
// process sharing the same file.
// =============================================================================

use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::LedgerError;
use crate::ledger::AccountState;

/// A ledger snapshot and the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedState {
    pub version: u64,
    pub state: AccountState,
}

pub struct StateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Load the ledger, or persist `initial` as version 1 if none exists yet.
    pub fn load_or_init(&self, initial: AccountState) -> Result<VersionedState, LedgerError> {
        let _guard = self.lock.lock();

        if let Some(existing) = self.read()? {
            debug!(path = %self.path.display(), version = existing.version, "ledger loaded");
            return Ok(existing);
        }

        let snapshot = VersionedState {
            version: 1,
            state: initial,
        };
        self.write(&snapshot)?;
        info!(
            path = %self.path.display(),
            remaining_capital = snapshot.state.remaining_capital,
            start_time = snapshot.state.start_time,
            "ledger initialised"
        );
        Ok(snapshot)
    }

    /// Load the current ledger snapshot.
    pub fn load(&self) -> Result<VersionedState, LedgerError> {
        let _guard = self.lock.lock();
        self.read()?.ok_or_else(|| {
            LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no ledger at {}", self.path.display()),
            ))
        })
    }

    /// Write `state` if the stored version is still `expected_version`.
    ///
    /// Returns the new version on success.
    pub fn compare_and_swap(
        &self,
        expected_version: u64,
        state: &AccountState,
    ) -> Result<u64, LedgerError> {
        let _guard = self.lock.lock();

        let found = self.read()?.map(|s| s.version).unwrap_or(0);
        if found != expected_version {
            warn!(
                expected = expected_version,
                found, "ledger write rejected: stale version"
            );
            return Err(LedgerError::VersionConflict {
                expected: expected_version,
                found,
            });
        }

        let snapshot = VersionedState {
            version: expected_version + 1,
            state: state.clone(),
        };
        self.write(&snapshot)?;
        debug!(version = snapshot.version, "ledger written");
        Ok(snapshot.version)
    }

    // -------------------------------------------------------------------------
    // Internal helpers (caller holds the lock)
    // -------------------------------------------------------------------------

    fn read(&self) -> Result<Option<VersionedState>, LedgerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write(&self, snapshot: &VersionedState) -> Result<(), LedgerError> {
        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").field("path", &self.path).finish()
    }
}
