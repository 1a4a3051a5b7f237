// =============================================================================
// Configuration — immutable allocation plan plus service settings
// =============================================================================
//
// `PlanConfig` holds every constant that shapes the allocation engine. It is
// constructed once at startup and passed by reference into each computation.
//
// `AppConfig` wraps the plan with the settings of the surrounding service
// (symbol, persistence path, bind address). It is read from JSON; every field
// carries a serde default so older files keep loading when fields are added.
// Saving uses an atomic tmp + rename.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::AccountMode;

/// Bar widths (hours) the exchange can serve as klines.
const SUPPORTED_BAR_HOURS: [f64; 7] = [1.0, 2.0, 4.0, 6.0, 12.0, 24.0, 168.0];

/// Upper bound on klines returned by one request.
const MAX_CANDLE_LIMIT: usize = 1000;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_total_capital() -> f64 {
    10_000.0
}

fn default_allocation_period_days() -> f64 {
    30.0
}

fn default_buy_interval_hours() -> f64 {
    12.0
}

fn default_sensitivity() -> f64 {
    3.0
}

fn default_min_buy_percent() -> f64 {
    0.4
}

fn default_max_buy_percent() -> f64 {
    2.5
}

fn default_circuit_breaker_ratio() -> f64 {
    0.25
}

fn default_volatility_lookback() -> usize {
    crate::indicators::volatility::DEFAULT_LOOKBACK
}

fn default_volatility_weight() -> f64 {
    0.25
}

fn default_rsi_period() -> usize {
    crate::indicators::rsi::DEFAULT_PERIOD
}

fn default_rsi_weight() -> f64 {
    0.30
}

fn default_bb_period() -> usize {
    crate::indicators::bollinger::DEFAULT_PERIOD
}

fn default_bb_std_dev_multiplier() -> f64 {
    crate::indicators::bollinger::DEFAULT_STD_DEV_MULTIPLIER
}

fn default_bb_weight() -> f64 {
    0.45
}

fn default_candle_interval_hours() -> f64 {
    crate::indicators::volatility::DEFAULT_BAR_HOURS
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_category() -> String {
    "linear".to_string()
}

fn default_state_path() -> String {
    "dca_state.json".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_base_url() -> String {
    "https://api.bybit.com".to_string()
}

fn default_candle_limit() -> usize {
    60
}

fn default_metrics_interval_minutes() -> u64 {
    60
}

// =============================================================================
// PlanConfig
// =============================================================================

/// The DCA plan: budget, horizon, cadence, and the tuning of every signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Quote currency committed to the whole plan.
    #[serde(default = "default_total_capital")]
    pub total_capital: f64,

    /// Length of the plan in days.
    #[serde(default = "default_allocation_period_days")]
    pub allocation_period_days: f64,

    /// Hours between scheduled buys.
    #[serde(default = "default_buy_interval_hours")]
    pub buy_interval_hours: f64,

    /// How strongly the mean-reversion factor reacts to price deviation.
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Floor of the mean-reversion factor, and the rate reserved for future
    /// intervals by the capital-preservation bound.
    #[serde(default = "default_min_buy_percent")]
    pub min_buy_percent: f64,

    /// Ceiling of the mean-reversion factor.
    #[serde(default = "default_max_buy_percent")]
    pub max_buy_percent: f64,

    /// Hard per-cycle cap as a fraction of remaining capital.
    #[serde(default = "default_circuit_breaker_ratio")]
    pub circuit_breaker_ratio: f64,

    #[serde(default = "default_volatility_lookback")]
    pub volatility_lookback: usize,

    #[serde(default = "default_volatility_weight")]
    pub volatility_weight: f64,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_rsi_weight")]
    pub rsi_weight: f64,

    #[serde(default = "default_bb_period")]
    pub bb_period: usize,

    #[serde(default = "default_bb_std_dev_multiplier")]
    pub bb_std_dev_multiplier: f64,

    #[serde(default = "default_bb_weight")]
    pub bb_weight: f64,

    /// Width of one candle in hours. Drives both the kline interval requested
    /// from the exchange and the volatility annualization.
    #[serde(default = "default_candle_interval_hours")]
    pub candle_interval_hours: f64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            total_capital: default_total_capital(),
            allocation_period_days: default_allocation_period_days(),
            buy_interval_hours: default_buy_interval_hours(),
            sensitivity: default_sensitivity(),
            min_buy_percent: default_min_buy_percent(),
            max_buy_percent: default_max_buy_percent(),
            circuit_breaker_ratio: default_circuit_breaker_ratio(),
            volatility_lookback: default_volatility_lookback(),
            volatility_weight: default_volatility_weight(),
            rsi_period: default_rsi_period(),
            rsi_weight: default_rsi_weight(),
            bb_period: default_bb_period(),
            bb_std_dev_multiplier: default_bb_std_dev_multiplier(),
            bb_weight: default_bb_weight(),
            candle_interval_hours: default_candle_interval_hours(),
        }
    }
}

impl PlanConfig {
    /// Number of scheduled buys over the whole plan.
    pub fn total_intervals(&self) -> f64 {
        self.allocation_period_days * 24.0 / self.buy_interval_hours
    }

    /// Minimum candle history that satisfies all three indicators.
    pub fn required_candles(&self) -> usize {
        (self.rsi_period * 2)
            .max(self.bb_period)
            .max(self.volatility_lookback + 1)
    }

    /// Reject plans the engine cannot run sensibly.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.total_capital.is_finite() && self.total_capital > 0.0,
            "total_capital must be positive, got {}",
            self.total_capital
        );
        anyhow::ensure!(
            self.allocation_period_days > 0.0,
            "allocation_period_days must be positive, got {}",
            self.allocation_period_days
        );
        anyhow::ensure!(
            self.buy_interval_hours > 0.0,
            "buy_interval_hours must be positive, got {}",
            self.buy_interval_hours
        );
        anyhow::ensure!(
            self.sensitivity >= 0.0,
            "sensitivity must not be negative, got {}",
            self.sensitivity
        );
        anyhow::ensure!(
            self.min_buy_percent >= 0.0 && self.min_buy_percent <= self.max_buy_percent,
            "min_buy_percent ({}) must be in [0, max_buy_percent ({})]",
            self.min_buy_percent,
            self.max_buy_percent
        );
        anyhow::ensure!(
            self.max_buy_percent > 0.0,
            "max_buy_percent must be positive, got {}",
            self.max_buy_percent
        );
        anyhow::ensure!(
            self.circuit_breaker_ratio > 0.0 && self.circuit_breaker_ratio <= 1.0,
            "circuit_breaker_ratio must be in (0, 1], got {}",
            self.circuit_breaker_ratio
        );
        anyhow::ensure!(
            self.volatility_lookback >= 1 && self.rsi_period >= 1 && self.bb_period >= 1,
            "indicator periods must be at least 1"
        );
        anyhow::ensure!(
            self.volatility_weight >= 0.0 && self.rsi_weight >= 0.0 && self.bb_weight >= 0.0,
            "indicator weights must not be negative"
        );
        anyhow::ensure!(
            self.bb_std_dev_multiplier > 0.0,
            "bb_std_dev_multiplier must be positive, got {}",
            self.bb_std_dev_multiplier
        );
        anyhow::ensure!(
            SUPPORTED_BAR_HOURS.contains(&self.candle_interval_hours),
            "candle_interval_hours {} is not one of {:?}",
            self.candle_interval_hours,
            SUPPORTED_BAR_HOURS
        );
        Ok(())
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Top-level configuration of the DCA service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Instrument bought by the plan, e.g. "BTCUSDT".
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Bybit product category ("linear" or "spot").
    #[serde(default = "default_category")]
    pub category: String,

    /// Demo simulates fills locally; Live sends real orders.
    #[serde(default)]
    pub account_mode: AccountMode,

    /// Where the account ledger is persisted.
    #[serde(default = "default_state_path")]
    pub state_path: String,

    /// Listen address of the read-only status API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Klines requested per cycle.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,

    #[serde(default = "default_metrics_interval_minutes")]
    pub metrics_interval_minutes: u64,

    #[serde(default)]
    pub plan: PlanConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            category: default_category(),
            account_mode: AccountMode::Demo,
            state_path: default_state_path(),
            bind_addr: default_bind_addr(),
            base_url: default_base_url(),
            candle_limit: default_candle_limit(),
            metrics_interval_minutes: default_metrics_interval_minutes(),
            plan: PlanConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            account_mode = %config.account_mode,
            "config loaded"
        );

        Ok(config)
    }

    /// Load `path`, or write and return the defaults when no file exists.
    ///
    /// A file that exists but cannot be read or parsed is an error; it never
    /// degrades to defaults.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path).context("invalid configuration file");
        }

        warn!(path = %path.display(), "no config file, writing defaults");
        let defaults = Self::default();
        defaults.save(path)?;
        Ok(defaults)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }

    /// Apply `DCA_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(symbol) = std::env::var("DCA_SYMBOL") {
            let symbol = symbol.trim().to_uppercase();
            if !symbol.is_empty() {
                self.symbol = symbol;
            }
        }
        if let Ok(mode) = std::env::var("DCA_ACCOUNT_MODE") {
            self.account_mode = mode.parse()?;
        }
        if let Ok(path) = std::env::var("DCA_STATE_PATH") {
            self.state_path = path;
        }
        if let Ok(addr) = std::env::var("DCA_BIND_ADDR") {
            self.bind_addr = addr;
        }
        Ok(())
    }

    /// Kline interval code understood by Bybit for the plan's bar width.
    pub fn kline_interval(&self) -> String {
        kline_interval_code(self.plan.candle_interval_hours)
    }

    pub fn validate(&self) -> Result<()> {
        self.plan.validate()?;
        anyhow::ensure!(!self.symbol.is_empty(), "symbol must not be empty");
        anyhow::ensure!(
            self.category == "linear" || self.category == "spot",
            "category must be linear or spot, got {}",
            self.category
        );
        let required = self.plan.required_candles();
        anyhow::ensure!(
            self.candle_limit >= required && self.candle_limit <= MAX_CANDLE_LIMIT,
            "candle_limit {} must be in [{required}, {MAX_CANDLE_LIMIT}]",
            self.candle_limit
        );
        anyhow::ensure!(
            self.metrics_interval_minutes > 0,
            "metrics_interval_minutes must be positive"
        );
        Ok(())
    }
}

/// Bybit encodes kline intervals in minutes, with "D" and "W" for a day and
/// a week.
fn kline_interval_code(hours: f64) -> String {
    if hours == 24.0 {
        "D".to_string()
    } else if hours == 168.0 {
        "W".to_string()
    } else {
        format!("{}", (hours * 60.0).round() as u64)
    }
}
