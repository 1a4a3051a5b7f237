// =============================================================================
// Account Ledger — remaining budget, accumulated position, purchase history
// =============================================================================
//
// Mutated only after a confirmed fill. Purchase records are append-only.

use serde::{Deserialize, Serialize};

/// One confirmed buy. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub timestamp: i64,
    pub price: f64,
    pub quote_spent: f64,
    pub base_bought: f64,
    /// Volume-weighted average entry price after this purchase.
    pub average_price_after: f64,
    pub capital_remaining_after: f64,
}

/// State of one allocation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub remaining_capital: f64,
    pub total_accumulated: f64,
    pub weighted_sum_cost: f64,
    #[serde(default)]
    pub purchase_history: Vec<PurchaseRecord>,
    /// Plan start, milliseconds since the UNIX epoch.
    pub start_time: i64,
}

impl AccountState {
    /// A plan that has not bought anything yet.
    pub fn new(total_capital: f64, start_time: i64) -> Self {
        Self {
            remaining_capital: total_capital,
            total_accumulated: 0.0,
            weighted_sum_cost: 0.0,
            purchase_history: Vec::new(),
            start_time,
        }
    }

    /// Volume-weighted average entry price, once anything is held.
    pub fn average_cost(&self) -> Option<f64> {
        (self.total_accumulated > 0.0).then(|| self.weighted_sum_cost / self.total_accumulated)
    }

    /// Quote currency spent so far.
    pub fn total_invested(&self) -> f64 {
        self.weighted_sum_cost
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_capital <= 0.0
    }

    /// Apply a confirmed fill and append its record.
    ///
    /// Remaining capital is floored at zero so that rounding dust on the final
    /// buy cannot leave the ledger negative.
    pub fn record_purchase(
        &mut self,
        timestamp: i64,
        price: f64,
        quote_spent: f64,
        base_bought: f64,
    ) -> &PurchaseRecord {
        self.remaining_capital = (self.remaining_capital - quote_spent).max(0.0);
        self.total_accumulated += base_bought;
        self.weighted_sum_cost += quote_spent;

        let average_price_after = self.average_cost().unwrap_or(price);

        self.purchase_history.push(PurchaseRecord {
            timestamp,
            price,
            quote_spent,
            base_bought,
            average_price_after,
            capital_remaining_after: self.remaining_capital,
        });

        &self.purchase_history[self.purchase_history.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_holds_nothing() {
        let state = AccountState::new(10_000.0, 42);
        assert_eq!(state.remaining_capital, 10_000.0);
        assert_eq!(state.average_cost(), None);
        assert!(state.purchase_history.is_empty());
        assert_eq!(state.start_time, 42);
    }

    #[test]
    fn purchases_update_weighted_average() {
        let mut state = AccountState::new(10_000.0, 0);
        state.record_purchase(1, 100.0, 1_000.0, 10.0);
        let rec = state.record_purchase(2, 50.0, 1_000.0, 20.0).clone();

        assert_eq!(state.remaining_capital, 8_000.0);
        assert_eq!(state.total_accumulated, 30.0);
        assert_eq!(state.weighted_sum_cost, 2_000.0);
        assert!((state.average_cost().unwrap() - 2_000.0 / 30.0).abs() < 1e-12);

        assert_eq!(rec.timestamp, 2);
        assert_eq!(rec.capital_remaining_after, 8_000.0);
        assert!((rec.average_price_after - 66.666_666_666_666_67).abs() < 1e-9);
        assert_eq!(state.purchase_history.len(), 2);
        assert_eq!(state.purchase_history[0].average_price_after, 100.0);
    }

    #[test]
    fn overspend_dust_floors_remaining_at_zero() {
        let mut state = AccountState::new(100.0, 0);
        state.record_purchase(1, 10.0, 100.000_000_1, 10.0);
        assert_eq!(state.remaining_capital, 0.0);
        assert!(state.is_exhausted());
    }

    #[test]
    fn state_json_roundtrip_tolerates_missing_history() {
        let json = r#"{"remaining_capital":5.0,"total_accumulated":0.0,"weighted_sum_cost":0.0,"start_time":7}"#;
        let state: AccountState = serde_json::from_str(json).unwrap();
        assert!(state.purchase_history.is_empty());
        assert_eq!(state.start_time, 7);
    }
}
