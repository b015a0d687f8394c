//! Per-symbol holdings with T+1 settlement.
//!
//! Shares bought today count towards `total_quantity` immediately but only become
//! sellable (`available_quantity`) after the next [`Position::settle`].

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    symbol: String,
    lot_size: i64,
    total_quantity: i64,
    available_quantity: i64,
    average_cost: f64,
    pending_sell_quantity: i64,
}

impl Position {
    pub fn new(symbol: &str, lot_size: i64) -> Self {
        Position {
            symbol: symbol.to_string(),
            lot_size: lot_size.max(1),
            total_quantity: 0,
            available_quantity: 0,
            average_cost: 0.0,
            pending_sell_quantity: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Shares held; negative only for a permitted short position.
    pub fn total_quantity(&self) -> i64 {
        self.total_quantity
    }

    pub fn available_quantity(&self) -> i64 {
        self.available_quantity
    }

    pub fn average_cost(&self) -> f64 {
        self.average_cost
    }

    pub fn pending_sell_quantity(&self) -> i64 {
        self.pending_sell_quantity
    }

    /// Available shares not already committed to an outstanding sell order.
    pub fn sellable_quantity(&self) -> i64 {
        (self.available_quantity - self.pending_sell_quantity).max(0)
    }

    pub fn is_long(&self) -> bool {
        self.total_quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.total_quantity < 0
    }

    pub fn is_flat(&self) -> bool {
        self.total_quantity == 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.total_quantity as f64 * price
    }

    /// Return relative to average cost, signed so that a gain is positive for both
    /// long and short positions. `None` while flat.
    pub fn unrealized_return(&self, price: f64) -> Option<f64> {
        if self.is_flat() || self.average_cost <= 0.0 {
            return None;
        }
        let change = (price - self.average_cost) / self.average_cost;
        Some(if self.is_long() { change } else { -change })
    }

    /// Books a buy fill and returns the quantity actually applied.
    ///
    /// The quantity is rounded down to whole lots. A buy against a short position covers
    /// it first; any remainder opens a long at `price`. Available quantity is untouched.
    pub fn apply_buy(&mut self, quantity: i64, price: f64) -> i64 {
        let lots = quantity.max(0) / self.lot_size * self.lot_size;
        if lots == 0 {
            tracing::warn!(
                symbol = %self.symbol,
                quantity,
                lot_size = self.lot_size,
                "buy below one lot ignored"
            );
            return 0;
        }
        if lots != quantity {
            tracing::warn!(
                symbol = %self.symbol,
                quantity,
                applied = lots,
                "buy rounded down to whole lots"
            );
        }

        if self.is_short() {
            let cover = lots.min(-self.total_quantity);
            self.total_quantity += cover;
            let remainder = lots - cover;
            if self.total_quantity == 0 {
                self.average_cost = 0.0;
            }
            if remainder > 0 {
                self.total_quantity = remainder;
                self.average_cost = price;
            }
            return lots;
        }

        let held = self.total_quantity as f64;
        let added = lots as f64;
        self.average_cost = (held * self.average_cost + added * price) / (held + added);
        self.total_quantity += lots;
        lots
    }

    /// Books a sell fill and returns the quantity actually applied.
    ///
    /// Long holdings can only be sold down to zero, limited to the available quantity.
    /// With `allow_short`, a sell against a flat or short position opens or extends the
    /// short instead.
    pub fn apply_sell(&mut self, quantity: i64, price: f64, allow_short: bool) -> i64 {
        if quantity <= 0 {
            return 0;
        }

        if allow_short && self.total_quantity <= 0 {
            let short = (-self.total_quantity) as f64;
            let added = quantity as f64;
            self.average_cost = (short * self.average_cost + added * price) / (short + added);
            self.total_quantity -= quantity;
            return quantity;
        }

        let executed = quantity.min(self.available_quantity.max(0));
        if executed < quantity {
            tracing::warn!(
                symbol = %self.symbol,
                requested = quantity,
                available = self.available_quantity,
                "sell clamped to available quantity"
            );
        }

        self.total_quantity -= executed;
        self.available_quantity -= executed;
        if self.total_quantity < 0 {
            tracing::warn!(
                symbol = %self.symbol,
                quantity = self.total_quantity,
                "negative holding after sell, clamped to zero"
            );
            self.total_quantity = 0;
        }
        if self.total_quantity == 0 {
            self.average_cost = 0.0;
            self.available_quantity = 0;
        }
        executed
    }

    /// T+1 unlock: everything held becomes sellable.
    pub fn settle(&mut self) {
        self.available_quantity = self.total_quantity.max(0);
    }

    pub fn reserve_sell(&mut self, quantity: i64) {
        self.pending_sell_quantity += quantity.max(0);
    }

    pub fn release_sell(&mut self, quantity: i64) {
        self.pending_sell_quantity -= quantity.max(0);
        if self.pending_sell_quantity < 0 {
            tracing::warn!(
                symbol = %self.symbol,
                pending = self.pending_sell_quantity,
                "pending sell quantity went negative, clamped to zero"
            );
            self.pending_sell_quantity = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled_long(quantity: i64, price: f64) -> Position {
        let mut pos = Position::new("600036", 100);
        pos.apply_buy(quantity, price);
        pos.settle();
        pos
    }

    #[test]
    fn new_position_is_flat() {
        let pos = Position::new("600036", 100);
        assert!(pos.is_flat());
        assert_eq!(pos.average_cost(), 0.0);
        assert_eq!(pos.sellable_quantity(), 0);
        assert_eq!(pos.unrealized_return(10.0), None);
    }

    #[test]
    fn buy_updates_total_but_not_available() {
        let mut pos = Position::new("600036", 100);
        assert_eq!(pos.apply_buy(1000, 10.0), 1000);
        assert_eq!(pos.total_quantity(), 1000);
        assert_eq!(pos.available_quantity(), 0);
        assert!((pos.average_cost() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn average_cost_is_volume_weighted() {
        let mut pos = Position::new("600036", 100);
        pos.apply_buy(100, 10.0);
        pos.apply_buy(300, 12.0);
        // (100*10 + 300*12) / 400 = 11.5
        assert!((pos.average_cost() - 11.5).abs() < 1e-12);
        assert_eq!(pos.total_quantity(), 400);
    }

    #[test]
    fn buy_rounds_down_to_lot() {
        let mut pos = Position::new("600036", 100);
        assert_eq!(pos.apply_buy(250, 10.0), 200);
        assert_eq!(pos.total_quantity(), 200);
    }

    #[test]
    fn buy_below_one_lot_is_ignored() {
        let mut pos = Position::new("600036", 100);
        assert_eq!(pos.apply_buy(99, 10.0), 0);
        assert!(pos.is_flat());
        assert_eq!(pos.apply_buy(-100, 10.0), 0);
        assert!(pos.is_flat());
    }

    #[test]
    fn settle_unlocks_everything_held() {
        let mut pos = settled_long(1000, 10.0);
        pos.apply_buy(500, 11.0);
        assert_eq!(pos.available_quantity(), 1000);
        pos.apply_sell(300, 11.0, false);
        pos.settle();
        assert_eq!(pos.available_quantity(), pos.total_quantity());
        assert_eq!(pos.total_quantity(), 1200);
    }

    #[test]
    fn shares_bought_today_cannot_be_sold() {
        let mut pos = Position::new("600036", 100);
        pos.apply_buy(1000, 10.0);
        assert_eq!(pos.apply_sell(1000, 10.5, false), 0);
        assert_eq!(pos.total_quantity(), 1000);
    }

    #[test]
    fn oversell_is_clamped_to_available() {
        let mut pos = settled_long(1000, 10.0);
        assert_eq!(pos.apply_sell(2000, 11.0, false), 1000);
        assert_eq!(pos.total_quantity(), 0);
        assert_eq!(pos.available_quantity(), 0);
        assert_eq!(pos.average_cost(), 0.0);
    }

    #[test]
    fn partial_sell_keeps_average_cost() {
        let mut pos = settled_long(1000, 10.0);
        assert_eq!(pos.apply_sell(400, 12.0, false), 400);
        assert_eq!(pos.total_quantity(), 600);
        assert_eq!(pos.available_quantity(), 600);
        assert!((pos.average_cost() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn odd_lot_sells_are_allowed() {
        let mut pos = settled_long(1000, 10.0);
        assert_eq!(pos.apply_sell(150, 10.0, false), 150);
        assert_eq!(pos.total_quantity(), 850);
    }

    #[test]
    fn pending_sells_reduce_sellable_quantity() {
        let mut pos = settled_long(1000, 10.0);
        pos.reserve_sell(600);
        assert_eq!(pos.sellable_quantity(), 400);
        pos.release_sell(600);
        assert_eq!(pos.sellable_quantity(), 1000);
        pos.release_sell(100);
        assert_eq!(pos.pending_sell_quantity(), 0);
    }

    #[test]
    fn short_sell_requires_permission() {
        let mut pos = Position::new("600036", 100);
        assert_eq!(pos.apply_sell(500, 10.0, false), 0);
        assert!(pos.is_flat());

        assert_eq!(pos.apply_sell(500, 10.0, true), 500);
        assert_eq!(pos.total_quantity(), -500);
        assert!(pos.is_short());
        pos.settle();
        assert_eq!(pos.available_quantity(), 0);
    }

    #[test]
    fn short_average_cost_and_return() {
        let mut pos = Position::new("600036", 100);
        pos.apply_sell(100, 10.0, true);
        pos.apply_sell(100, 12.0, true);
        assert!((pos.average_cost() - 11.0).abs() < 1e-12);
        // Price falling is a gain for a short.
        let ret = pos.unrealized_return(9.9).unwrap();
        assert!((ret - 0.1).abs() < 1e-12);
    }

    #[test]
    fn buy_covers_short_then_opens_long() {
        let mut pos = Position::new("600036", 100);
        pos.apply_sell(200, 10.0, true);
        assert_eq!(pos.apply_buy(300, 9.0), 300);
        assert_eq!(pos.total_quantity(), 100);
        assert!((pos.average_cost() - 9.0).abs() < f64::EPSILON);
        assert_eq!(pos.available_quantity(), 0);
    }

    #[test]
    fn exact_cover_resets_cost() {
        let mut pos = Position::new("600036", 100);
        pos.apply_sell(200, 10.0, true);
        pos.apply_buy(200, 9.0);
        assert!(pos.is_flat());
        assert_eq!(pos.average_cost(), 0.0);
    }

    #[test]
    fn selling_a_long_never_flips_short() {
        let mut pos = settled_long(300, 10.0);
        assert_eq!(pos.apply_sell(500, 10.0, true), 300);
        assert!(pos.is_flat());
    }

    #[test]
    fn unrealized_return_long() {
        let pos = settled_long(1000, 10.0);
        let ret = pos.unrealized_return(8.5).unwrap();
        assert!((ret + 0.15).abs() < 1e-12);
        assert!((pos.market_value(8.5) - 8500.0).abs() < 1e-9);
    }
}
