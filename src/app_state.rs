// =============================================================================
// Central Application State — adaptive DCA
// =============================================================================
//
// Shared between the buy loop, the metrics loop and the status API via
// `Arc<AppState>`. The ledger itself lives in the `StateStore`; this struct
// only caches what the API reports about recent cycles.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::bybit::BybitClient;
use crate::config::AppConfig;
use crate::execution::{BuyExecutor, CycleReport};
use crate::store::StateStore;

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// A failed cycle, kept for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

pub struct AppState {
    // ── Configuration ───────────────────────────────────────────────────
    pub config: Arc<AppConfig>,

    // ── Collaborators ───────────────────────────────────────────────────
    pub client: Arc<BybitClient>,
    pub store: Arc<StateStore>,
    pub executor: BuyExecutor,

    // ── Cycle history ───────────────────────────────────────────────────
    pub cycles_completed: AtomicU64,
    pub last_report: RwLock<Option<CycleReport>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Instant the process started, for uptime.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: AppConfig, client: BybitClient, store: StateStore) -> Self {
        let config = Arc::new(config);
        let client = Arc::new(client);
        let store = Arc::new(store);
        let executor = BuyExecutor::new(client.clone(), store.clone(), config.clone());

        Self {
            config,
            client,
            store,
            executor,
            cycles_completed: AtomicU64::new(0),
            last_report: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Store the result of a finished cycle.
    pub fn record_cycle(&self, report: CycleReport) {
        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        *self.last_report.write() = Some(report);
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::SeqCst)
    }

    /// Record a failed cycle. Oldest entries are evicted past
    /// [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, message: String) {
        let mut errors = self.recent_errors.write();
        if errors.len() >= MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        errors.push(ErrorRecord {
            message,
            at: Utc::now().to_rfc3339(),
        });
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
