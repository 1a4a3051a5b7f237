// =============================================================================
// Buy Cycle Execution — data fetch, allocation, order, ledger update
// =============================================================================
//
// One cycle:
//   1. Fetch price, candles and lot-size rules concurrently.
//   2. Read the versioned ledger.
//   3. Ask the allocation engine how much to spend.
//   4. Convert to a base quantity rounded down to the lot step.
//   5. Place a market buy (live) or simulate it (demo).
//   6. Apply the fill to the ledger and write it with compare-and-swap.
//
// Nothing is retried. A failed fetch or order aborts the cycle with the
// ledger untouched; the next scheduled cycle starts fresh.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::allocation::{calculate_buy_size, BindingLimit, BuyDecision};
use crate::bybit::{BybitClient, InstrumentInfo, OrderAck};
use crate::config::AppConfig;
use crate::errors::AllocationError;
use crate::store::StateStore;
use crate::types::AccountMode;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What a confirmed (or simulated) fill did to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillSummary {
    pub price: f64,
    pub qty: f64,
    pub quote_spent: f64,
    pub average_price_after: f64,
    pub capital_remaining_after: f64,
    pub ledger_version: u64,
}

/// Outcome of one buy cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CycleOutcome {
    /// Order accepted by the exchange (live mode).
    Filled { order: OrderAck, fill: FillSummary },
    /// Order simulated locally (demo mode).
    Simulated { order_link_id: String, fill: FillSummary },
    /// Nothing was bought this cycle.
    Skipped(String),
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filled { order, fill } => {
                write!(f, "Filled({} qty={} spent={:.2})", order.order_id, fill.qty, fill.quote_spent)
            }
            Self::Simulated { fill, .. } => {
                write!(f, "Simulated(qty={} spent={:.2})", fill.qty, fill.quote_spent)
            }
            Self::Skipped(reason) => write!(f, "Skipped({reason})"),
        }
    }
}

/// Record of a finished cycle, kept for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub at: i64,
    pub outcome: CycleOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<BuyDecision>,
}

/// An order sized to the exchange's lot rules.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub qty: f64,
    /// `qty` formatted with exactly the step's decimal places.
    pub qty_text: String,
    pub quote_amount: f64,
}

// ---------------------------------------------------------------------------
// Order sizing
// ---------------------------------------------------------------------------

/// Decimal places carried by a lot step such as 0.001.
pub fn step_decimals(step: f64) -> usize {
    let text = format!("{step}");
    text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
}

/// Largest multiple of `step` not above `value`.
pub fn round_down_to_step(value: f64, step: f64) -> f64 {
    // The epsilon absorbs representation error such as 0.3 / 0.1 = 2.999...
    let units = (value / step + 1e-9).floor();
    let scale = 10f64.powi(step_decimals(step) as i32);
    (units * step * scale).round() / scale
}

/// Size a spend of `amount` quote currency at `price`. `None` when the
/// resulting quantity is below the exchange minimum.
pub fn plan_order(amount: f64, price: f64, instrument: &InstrumentInfo) -> Option<PlannedOrder> {
    if amount <= 0.0 || price <= 0.0 {
        return None;
    }
    let qty = round_down_to_step(amount / price, instrument.qty_step);
    if qty <= 0.0 || qty < instrument.min_order_qty {
        return None;
    }
    Some(PlannedOrder {
        qty,
        qty_text: format!("{:.*}", step_decimals(instrument.qty_step), qty),
        quote_amount: qty * price,
    })
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Ties the exchange client, the ledger store and the allocation engine
/// together for one buy cycle at a time.
pub struct BuyExecutor {
    pub client: Arc<BybitClient>,
    pub store: Arc<StateStore>,
    pub config: Arc<AppConfig>,
}

impl BuyExecutor {
    pub fn new(client: Arc<BybitClient>, store: Arc<StateStore>, config: Arc<AppConfig>) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Run one buy cycle at `now_ms`.
    pub async fn run_cycle(&self, now_ms: i64) -> Result<CycleReport> {
        let symbol = self.config.symbol.as_str();
        info!(symbol, mode = %self.config.account_mode, "executing buy cycle");

        let interval = self.config.kline_interval();
        let (price, candles, instrument) = tokio::try_join!(
            self.client.get_last_price(symbol),
            self.client.get_klines(symbol, &interval, self.config.candle_limit),
            self.client.get_instrument(symbol),
        )?;
        info!(symbol, price, candles = candles.len(), "market data fetched");

        let mut snapshot = self.store.load().context("failed to load ledger")?;

        if snapshot.state.is_exhausted() {
            info!(symbol, "plan capital fully deployed");
            return Ok(skipped(now_ms, "capital exhausted", None));
        }

        let decision =
            match calculate_buy_size(price, &candles, &snapshot.state, &self.config.plan, now_ms) {
                Ok(d) => d,
                Err(AllocationError::Indicator(e)) => {
                    warn!(symbol, error = %e, "indicator unavailable, skipping cycle");
                    return Ok(skipped(now_ms, &e.to_string(), None));
                }
                Err(e) => return Err(e.into()),
            };
        log_decision(&decision, price);

        let planned = match plan_order(decision.amount, price, &instrument) {
            Some(p) => p,
            None => {
                info!(
                    symbol,
                    amount = decision.amount,
                    min_order_qty = instrument.min_order_qty,
                    "buy size below exchange minimum, skipping"
                );
                return Ok(skipped(now_ms, "below minimum order size", Some(decision)));
            }
        };

        let order_link_id = format!("dca-{}", Uuid::new_v4().simple());
        info!(symbol, qty = %planned.qty_text, price, "will buy");

        let order = match self.config.account_mode {
            AccountMode::Live => Some(
                self.client
                    .place_market_buy(symbol, &planned.qty_text, &order_link_id)
                    .await?,
            ),
            AccountMode::Demo => {
                debug!(symbol, order_link_id = %order_link_id, "demo mode: order simulated");
                None
            }
        };

        // --- Ledger update -------------------------------------------------------
        let record = snapshot
            .state
            .record_purchase(now_ms, price, planned.quote_amount, planned.qty)
            .clone();

        let version = match self.store.compare_and_swap(snapshot.version, &snapshot.state) {
            Ok(v) => v,
            Err(e) => {
                // The order is already on the exchange; surface loudly.
                error!(
                    symbol,
                    order_link_id = %order_link_id,
                    qty = planned.qty,
                    error = %e,
                    "fill not recorded in ledger"
                );
                return Err(e).context("failed to record fill");
            }
        };

        let fill = FillSummary {
            price,
            qty: planned.qty,
            quote_spent: record.quote_spent,
            average_price_after: record.average_price_after,
            capital_remaining_after: record.capital_remaining_after,
            ledger_version: version,
        };
        info!(
            symbol,
            qty = fill.qty,
            price,
            average_price = fill.average_price_after,
            remaining_capital = fill.capital_remaining_after,
            "bought"
        );

        let outcome = match order {
            Some(order) => CycleOutcome::Filled { order, fill },
            None => CycleOutcome::Simulated { order_link_id, fill },
        };

        Ok(CycleReport {
            at: now_ms,
            outcome,
            decision: Some(decision),
        })
    }
}

impl std::fmt::Debug for BuyExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuyExecutor")
            .field("client", &self.client)
            .field("store", &self.store)
            .field("symbol", &self.config.symbol)
            .finish()
    }
}

fn skipped(at: i64, reason: &str, decision: Option<BuyDecision>) -> CycleReport {
    CycleReport {
        at,
        outcome: CycleOutcome::Skipped(reason.to_string()),
        decision,
    }
}

/// Emit the allocation breakdown as one structured event.
fn log_decision(decision: &BuyDecision, price: f64) {
    let Some(s) = &decision.signals else {
        info!(
            amount = decision.amount,
            intervals_remaining = decision.schedule.intervals_remaining,
            "final interval: spending all remaining capital"
        );
        return;
    };

    info!(
        base_buy_size = decision.base_buy_size,
        intervals_remaining = decision.schedule.intervals_remaining,
        price,
        cost_basis = s.cost_basis,
        volatility_pct = s.volatility * 100.0,
        rsi = s.rsi,
        bb_position = s.band_position,
        squeeze = s.squeeze,
        mean_reversion = s.mean_reversion_factor,
        vol_multiplier = s.volatility_multiplier,
        rsi_multiplier = s.rsi_multiplier,
        bb_multiplier = s.bollinger_multiplier,
        combined_multiplier = s.indicator_factor,
        final_buy_size = decision.amount,
        binding = %decision.binding,
        "buy size calculated"
    );

    if decision.binding == BindingLimit::CapitalPreservation && s.clamp.max_safe_buy < 0.0 {
        warn!(
            max_safe_buy = s.clamp.max_safe_buy,
            min_future_allocation = s.clamp.min_future_allocation,
            "capital reserve exceeds remaining capital, buy floored at zero"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(step: f64, min: f64) -> InstrumentInfo {
        InstrumentInfo {
            qty_step: step,
            min_order_qty: min,
        }
    }

    #[test]
    fn step_decimals_from_lot_step() {
        assert_eq!(step_decimals(0.001), 3);
        assert_eq!(step_decimals(0.000001), 6);
        assert_eq!(step_decimals(1.0), 0);
        assert_eq!(step_decimals(0.5), 1);
    }

    #[test]
    fn rounding_never_goes_up() {
        assert_eq!(round_down_to_step(0.0039, 0.001), 0.003);
        assert_eq!(round_down_to_step(12.9, 1.0), 12.0);
        assert_eq!(round_down_to_step(0.3, 0.1), 0.3);
    }

    #[test]
    fn plan_order_sizes_to_lot() {
        // 250 USDT at 60 000 = 0.0041666 BTC -> 0.004 BTC.
        let plan = plan_order(250.0, 60_000.0, &lot(0.001, 0.001)).unwrap();
        assert_eq!(plan.qty, 0.004);
        assert_eq!(plan.qty_text, "0.004");
        assert!((plan.quote_amount - 240.0).abs() < 1e-9);
        assert!(plan.quote_amount <= 250.0);
    }

    #[test]
    fn plan_order_skips_dust() {
        assert!(plan_order(30.0, 60_000.0, &lot(0.001, 0.001)).is_none());
        assert!(plan_order(0.0, 60_000.0, &lot(0.001, 0.001)).is_none());
        assert!(plan_order(100.0, 0.0, &lot(0.001, 0.001)).is_none());
    }

    #[test]
    fn plan_order_honours_minimum_quantity() {
        // 0.002 fits the step but not the 0.005 minimum.
        assert!(plan_order(150.0, 60_000.0, &lot(0.001, 0.005)).is_none());
    }

    #[test]
    fn outcome_display() {
        assert_eq!(CycleOutcome::Skipped("capital exhausted".into()).to_string(), "Skipped(capital exhausted)");
    }

    // ── Full cycle against a local exchange stub ────────────────────────

    use crate::ledger::AccountState;
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};

    const HOUR: i64 = 3_600_000;

    struct Market {
        price: f64,
        closes: Vec<f64>,
        qty_step: &'static str,
        min_qty: &'static str,
    }

    impl Market {
        fn wavy(n: usize) -> Self {
            Self {
                price: 100.0,
                closes: (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 2.0).collect(),
                qty_step: "0.001",
                min_qty: "0.001",
            }
        }
    }

    fn envelope(result: Value) -> Value {
        json!({ "retCode": 0, "retMsg": "OK", "result": result })
    }

    /// Serve canned v5 market payloads; returns the base URL.
    async fn serve(market: Market) -> String {
        let tickers = envelope(json!({
            "list": [{ "symbol": "BTCUSDT", "lastPrice": market.price.to_string() }]
        }));
        // Bybit lists klines newest first.
        let rows: Vec<Value> = market
            .closes
            .iter()
            .enumerate()
            .rev()
            .map(|(i, c)| {
                let c = c.to_string();
                json!([(i as i64 * 4 * HOUR).to_string(), c, c, c, c, "1", "1"])
            })
            .collect();
        let klines = envelope(json!({ "list": rows }));
        let instruments = envelope(json!({
            "list": [{ "lotSizeFilter": { "qtyStep": market.qty_step, "minOrderQty": market.min_qty } }]
        }));

        let app = Router::new()
            .route("/v5/market/tickers", get(move || async move { Json(tickers) }))
            .route("/v5/market/kline", get(move || async move { Json(klines) }))
            .route("/v5/market/instruments-info", get(move || async move { Json(instruments) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn demo_executor(base_url: String, dir: &tempfile::TempDir) -> BuyExecutor {
        let config = AppConfig {
            base_url: base_url.clone(),
            account_mode: AccountMode::Demo,
            ..AppConfig::default()
        };
        let client = BybitClient::new("", "", base_url, config.category.clone()).unwrap();
        let store = StateStore::new(dir.path().join("dca_state.json"));
        BuyExecutor::new(Arc::new(client), Arc::new(store), Arc::new(config))
    }

    #[tokio::test]
    async fn demo_cycle_records_simulated_fill() {
        let dir = tempfile::tempdir().unwrap();
        let exec = demo_executor(serve(Market::wavy(60)).await, &dir);
        exec.store.load_or_init(AccountState::new(10_000.0, 0)).unwrap();

        let report = exec.run_cycle(0).await.unwrap();
        let decision = report.decision.expect("decision recorded");
        let CycleOutcome::Simulated { order_link_id, fill } = &report.outcome else {
            panic!("expected simulated fill, got {}", report.outcome);
        };

        assert!(order_link_id.starts_with("dca-"));
        assert_eq!(fill.price, 100.0);
        assert_eq!(fill.ledger_version, 2);
        assert!(fill.quote_spent > 0.0);
        assert!(fill.quote_spent <= decision.amount + 1e-9);

        let snap = exec.store.load().unwrap();
        assert_eq!(snap.version, 2);
        assert_eq!(snap.state.purchase_history.len(), 1);
        assert!((snap.state.remaining_capital - (10_000.0 - fill.quote_spent)).abs() < 1e-9);
        assert!((snap.state.total_accumulated - fill.qty).abs() < 1e-12);
    }

    #[tokio::test]
    async fn exhausted_capital_skips_without_deciding() {
        let dir = tempfile::tempdir().unwrap();
        let exec = demo_executor(serve(Market::wavy(60)).await, &dir);
        let mut spent = AccountState::new(10_000.0, 0);
        spent.remaining_capital = 0.0;
        exec.store.load_or_init(spent).unwrap();

        let report = exec.run_cycle(0).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Skipped("capital exhausted".into()));
        assert!(report.decision.is_none());

        let snap = exec.store.load().unwrap();
        assert_eq!(snap.version, 1);
        assert!(snap.state.purchase_history.is_empty());
    }

    #[tokio::test]
    async fn short_history_skips_and_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let exec = demo_executor(serve(Market::wavy(10)).await, &dir);
        exec.store.load_or_init(AccountState::new(10_000.0, 0)).unwrap();

        let report = exec.run_cycle(0).await.unwrap();
        match &report.outcome {
            CycleOutcome::Skipped(reason) => assert!(reason.contains("insufficient data"), "{reason}"),
            other => panic!("expected skip, got {other}"),
        }
        assert!(report.decision.is_none());

        let snap = exec.store.load().unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.state.remaining_capital, 10_000.0);
        assert!(snap.state.purchase_history.is_empty());
    }

    #[tokio::test]
    async fn below_minimum_quantity_skips_but_keeps_decision() {
        let dir = tempfile::tempdir().unwrap();
        let market = Market {
            min_qty: "1000",
            ..Market::wavy(60)
        };
        let exec = demo_executor(serve(market).await, &dir);
        exec.store.load_or_init(AccountState::new(10_000.0, 0)).unwrap();

        let report = exec.run_cycle(0).await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Skipped("below minimum order size".into()));
        assert!(report.decision.expect("decision recorded").amount > 0.0);

        let snap = exec.store.load().unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.state.remaining_capital, 10_000.0);
        assert!(snap.state.purchase_history.is_empty());
    }
}
