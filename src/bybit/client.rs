// =============================================================================
// Bybit v5 REST Client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: The secret key is never logged or serialized. Signed requests
// carry the API key, timestamp, recv-window and signature as X-BAPI-* headers.
// The signature covers `timestamp + api_key + recv_window + body`.
//
// Every v5 response wraps its payload as `{ retCode, retMsg, result }`; any
// non-zero retCode is an error.
// =============================================================================

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

use crate::types::Candle;

type HmacSha256 = Hmac<Sha256>;

/// Default recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 5000;

/// Lot-size rules of a tradable instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstrumentInfo {
    /// Quantity increment accepted by the exchange.
    pub qty_step: f64,
    pub min_order_qty: f64,
}

/// Exchange acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAck {
    pub order_id: String,
    pub order_link_id: String,
}

/// Bybit REST API client with HMAC-SHA256 request signing.
#[derive(Clone)]
pub struct BybitClient {
    api_key: String,
    secret: String,
    base_url: String,
    category: String,
    client: reqwest::Client,
}

impl BybitClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a new `BybitClient`.
    ///
    /// # Arguments
    /// * `api_key`  — Bybit API key (sent as a header).
    /// * `secret`   — Bybit secret used exclusively for HMAC signing.
    /// * `base_url` — e.g. `https://api.bybit.com`.
    /// * `category` — product category, "linear" or "spot".
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        base_url: impl Into<String>,
        category: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into();
        debug!(base_url = %base_url, "BybitClient initialised");

        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url,
            category: category.into(),
            client,
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret.is_empty()
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `payload`.
    pub fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .context("invalid HMAC key")?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Current UNIX timestamp in milliseconds.
    pub fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// String covered by the signature of a POST request.
    fn signature_payload(&self, timestamp: u64, body: &str) -> String {
        format!("{timestamp}{}{RECV_WINDOW}{body}", self.api_key)
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /v5/market/tickers — last traded price of `symbol`.
    #[instrument(skip(self), name = "bybit::get_last_price")]
    pub async fn get_last_price(&self, symbol: &str) -> Result<f64> {
        let url = format!(
            "{}/v5/market/tickers?category={}&symbol={}",
            self.base_url, self.category, symbol
        );
        let result = self.get_public(&url, "GET /v5/market/tickers").await?;
        let price = Self::parse_last_price(&result)?;
        debug!(symbol, price, "last price retrieved");
        Ok(price)
    }

    /// GET /v5/market/kline — the most recent `limit` candles, oldest first.
    #[instrument(skip(self), name = "bybit::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/v5/market/kline?category={}&symbol={}&interval={}&limit={}",
            self.base_url, self.category, symbol, interval, limit
        );
        let result = self.get_public(&url, "GET /v5/market/kline").await?;
        let candles = Self::parse_klines(&result)?;
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /v5/market/instruments-info — lot-size filter of `symbol`.
    #[instrument(skip(self), name = "bybit::get_instrument")]
    pub async fn get_instrument(&self, symbol: &str) -> Result<InstrumentInfo> {
        let url = format!(
            "{}/v5/market/instruments-info?category={}&symbol={}",
            self.base_url, self.category, symbol
        );
        let result = self.get_public(&url, "GET /v5/market/instruments-info").await?;
        let info = Self::parse_instrument(&result)?;
        debug!(symbol, qty_step = info.qty_step, min_order_qty = info.min_order_qty, "instrument info retrieved");
        Ok(info)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// POST /v5/order/create (signed) — market buy of `qty` base units.
    #[instrument(skip(self), name = "bybit::place_market_buy")]
    pub async fn place_market_buy(&self, symbol: &str, qty: &str, order_link_id: &str) -> Result<OrderAck> {
        let mut body = serde_json::json!({
            "category": self.category,
            "symbol": symbol,
            "side": "Buy",
            "orderType": "Market",
            "qty": qty,
            "orderLinkId": order_link_id,
        });
        if self.category == "spot" {
            // Spot market buys are quoted in quote currency unless told otherwise.
            body["marketUnit"] = serde_json::Value::from("baseCoin");
        } else {
            body["positionIdx"] = serde_json::Value::from(0);
        }
        let body = body.to_string();

        let timestamp = Self::timestamp_ms();
        let signature = self.sign(&self.signature_payload(timestamp, &body))?;
        let url = format!("{}/v5/order/create", self.base_url);

        debug!(symbol, qty, order_link_id, "placing market buy");

        let resp = self
            .client
            .post(&url)
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW.to_string())
            .header("X-BAPI-SIGN", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("POST /v5/order/create request failed")?;

        let status = resp.status();
        let payload: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse order response")?;

        if !status.is_success() {
            anyhow::bail!("Bybit POST /v5/order/create returned {}: {}", status, payload);
        }
        let result = Self::unwrap_result(payload, "POST /v5/order/create")?;

        let ack = OrderAck {
            order_id: result["orderId"].as_str().unwrap_or_default().to_string(),
            order_link_id: result["orderLinkId"]
                .as_str()
                .unwrap_or(order_link_id)
                .to_string(),
        };
        debug!(symbol, order_id = %ack.order_id, "order placed successfully");
        Ok(ack)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    async fn get_public(&self, url: &str, endpoint: &str) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("{endpoint} request failed"))?;

        let status = resp.status();
        let payload: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse {endpoint} response"))?;

        if !status.is_success() {
            anyhow::bail!("Bybit {endpoint} returned {status}: {payload}");
        }
        Self::unwrap_result(payload, endpoint)
    }

    /// Check `retCode` and return the `result` object.
    fn unwrap_result(payload: serde_json::Value, endpoint: &str) -> Result<serde_json::Value> {
        let code = payload["retCode"].as_i64().unwrap_or(-1);
        if code != 0 {
            anyhow::bail!(
                "Bybit {endpoint} failed with retCode {code}: {}",
                payload["retMsg"].as_str().unwrap_or("<no message>")
            );
        }
        Ok(payload["result"].clone())
    }

    fn first_entry<'a>(result: &'a serde_json::Value, what: &str) -> Result<&'a serde_json::Value> {
        result["list"]
            .as_array()
            .and_then(|list| list.first())
            .with_context(|| format!("{what} response has an empty list"))
    }

    fn parse_last_price(result: &serde_json::Value) -> Result<f64> {
        let ticker = Self::first_entry(result, "ticker")?;
        Self::parse_str_f64(&ticker["lastPrice"]).context("ticker lastPrice")
    }

    /// Kline rows are `[start, open, high, low, close, volume, turnover]`,
    /// newest first. Returned candles are oldest first.
    fn parse_klines(result: &serde_json::Value) -> Result<Vec<Candle>> {
        let rows = result["list"]
            .as_array()
            .context("kline response missing 'list' array")?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let arr = row.as_array().context("kline entry is not an array")?;
            if arr.len() < 6 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }
            let timestamp = Self::parse_str_f64(&arr[0])? as i64;
            candles.push(Candle::new(
                timestamp,
                Self::parse_str_f64(&arr[1])?,
                Self::parse_str_f64(&arr[2])?,
                Self::parse_str_f64(&arr[3])?,
                Self::parse_str_f64(&arr[4])?,
                Self::parse_str_f64(&arr[5])?,
            ));
        }
        Ok(candles)
    }

    /// Derivatives publish `qtyStep`; spot publishes `basePrecision`.
    fn parse_instrument(result: &serde_json::Value) -> Result<InstrumentInfo> {
        let entry = Self::first_entry(result, "instruments-info")?;
        let lot = &entry["lotSizeFilter"];
        let step_field = if lot["qtyStep"].is_null() {
            &lot["basePrecision"]
        } else {
            &lot["qtyStep"]
        };
        let qty_step = Self::parse_str_f64(step_field).context("lotSizeFilter step")?;
        let min_order_qty = Self::parse_str_f64(&lot["minOrderQty"]).unwrap_or(0.0);
        anyhow::ensure!(qty_step > 0.0, "lotSizeFilter step must be positive, got {qty_step}");
        Ok(InstrumentInfo {
            qty_step,
            min_order_qty,
        })
    }

    /// Parse a JSON value that may be either a string or a number into `f64`.
    fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>()
                .with_context(|| format!("failed to parse '{s}' as f64"))
        } else if let Some(n) = val.as_f64() {
            Ok(n)
        } else {
            anyhow::bail!("expected string or number, got: {val}")
        }
    }
}

impl std::fmt::Debug for BybitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("category", &self.category)
            .finish()
    }
}
