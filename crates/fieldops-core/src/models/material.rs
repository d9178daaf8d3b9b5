//! Material catalog and per-service line items
//!
//! A material line snapshots the catalog price at first insertion: later
//! catalog price changes never retroactively alter existing lines.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Catalog material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    /// Current catalog price per unit
    pub price: Decimal,
    /// Unit of measure (e.g. "un", "m", "kg")
    pub unit: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Material line item attached to a service
///
/// At most one line exists per (service, material) pair; adding the same
/// material again accumulates quantity on the existing line using the
/// originally snapshotted unit price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMaterial {
    pub id: i32,
    pub service_id: i32,
    pub material_id: i32,
    /// Positive decimal quantity
    pub quantity: Decimal,
    /// Catalog price snapshot taken when the line was first created
    pub unit_price: Decimal,
    /// quantity × unit_price, rounded to 2 decimal places
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Round a monetary value to 2 decimal places, half-up
///
/// Applied at each total computation rather than only at the end, so
/// repeated additions cannot accumulate rounding drift.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl ServiceMaterial {
    /// Create a new line with a freshly snapshotted unit price
    pub fn new(service_id: i32, material_id: i32, quantity: Decimal, unit_price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            service_id,
            material_id,
            quantity,
            unit_price,
            total_price: round_money(quantity * unit_price),
            created_at: now,
            updated_at: now,
        }
    }

    /// Increase quantity on this line, keeping the snapshotted unit price
    pub fn add_quantity(&mut self, quantity: Decimal) {
        self.quantity += quantity;
        self.total_price = round_money(self.quantity * self.unit_price);
    }

    /// Replace the quantity on this line, keeping the snapshotted unit price
    pub fn set_quantity(&mut self, quantity: Decimal) {
        self.quantity = quantity;
        self.total_price = round_money(self.quantity * self.unit_price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_line_total_is_rounded() {
        let line = ServiceMaterial::new(1, 2, dec!(3), dec!(0.333));
        assert_eq!(line.total_price, dec!(1.00)); // 0.999 rounds half-up
    }

    #[test]
    fn test_add_quantity_keeps_snapshot_price() {
        let mut line = ServiceMaterial::new(1, 2, dec!(2), dec!(12.50));
        assert_eq!(line.total_price, dec!(25.00));

        line.add_quantity(dec!(1.5));
        assert_eq!(line.quantity, dec!(3.5));
        assert_eq!(line.unit_price, dec!(12.50));
        assert_eq!(line.total_price, dec!(43.75));
    }

    #[test]
    fn test_set_quantity_recomputes_total() {
        let mut line = ServiceMaterial::new(1, 2, dec!(2), dec!(10.00));
        line.set_quantity(dec!(5));
        assert_eq!(line.total_price, dec!(50.00));
    }

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(2.675)), dec!(2.68));
    }
}
