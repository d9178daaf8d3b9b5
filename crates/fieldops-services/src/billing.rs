//! Billing calculator
//!
//! Pure functions turning a job's accumulated distance, a city's per-km
//! rate, and its material lines into a total value. No state, no I/O;
//! identical inputs always produce identical output.

use fieldops_core::models::{round_money, ServiceMaterial};
use rust_decimal::Decimal;
use serde::Serialize;

/// Computed billing breakdown for a service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceTotals {
    /// Sum of material line totals
    pub materials_value: Decimal,

    /// Distance charge: accumulated km × city rate
    pub displacement_value: Decimal,

    /// materials_value + displacement_value
    pub total_value: Decimal,
}

/// Total for a single material line
///
/// Rounded to 2 decimal places half-up, like every monetary total.
pub fn material_line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round_money(quantity * unit_price)
}

/// Distance charge for a service
pub fn displacement_total(accumulated_km: Decimal, km_rate: Decimal) -> Decimal {
    round_money(accumulated_km * km_rate)
}

/// Full billing breakdown for a service
///
/// Each subtotal is rounded before summing so repeated recomputation
/// cannot drift.
pub fn service_totals(
    accumulated_km: Decimal,
    km_rate: Decimal,
    lines: &[ServiceMaterial],
) -> ServiceTotals {
    let materials_value = round_money(lines.iter().map(|l| l.total_price).sum::<Decimal>());
    let displacement_value = displacement_total(accumulated_km, km_rate);
    let total_value = round_money(materials_value + displacement_value);

    ServiceTotals {
        materials_value,
        displacement_value,
        total_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: Decimal, unit_price: Decimal) -> ServiceMaterial {
        ServiceMaterial::new(1, 1, quantity, unit_price)
    }

    #[test]
    fn test_material_line_total_rounds_half_up() {
        assert_eq!(material_line_total(dec!(3), dec!(0.335)), dec!(1.01));
        assert_eq!(material_line_total(dec!(2), dec!(12.50)), dec!(25.00));
    }

    #[test]
    fn test_displacement_total() {
        assert_eq!(displacement_total(dec!(10), dec!(2.50)), dec!(25.00));
        assert_eq!(displacement_total(dec!(0), dec!(2.50)), dec!(0.00));
        assert_eq!(displacement_total(dec!(3.333), dec!(3.00)), dec!(10.00));
    }

    #[test]
    fn test_service_totals_scenario() {
        // City at 2.50/km, one line of qty 2 at 12.50, 10 km traveled
        let lines = vec![line(dec!(2), dec!(12.50))];
        let totals = service_totals(dec!(10), dec!(2.50), &lines);

        assert_eq!(totals.materials_value, dec!(25.00));
        assert_eq!(totals.displacement_value, dec!(25.00));
        assert_eq!(totals.total_value, dec!(50.00));
    }

    #[test]
    fn test_service_totals_no_lines() {
        let totals = service_totals(dec!(4), dec!(1.75), &[]);

        assert_eq!(totals.materials_value, dec!(0.00));
        assert_eq!(totals.displacement_value, dec!(7.00));
        assert_eq!(totals.total_value, dec!(7.00));
    }

    #[test]
    fn test_service_totals_deterministic() {
        let lines = vec![line(dec!(1.5), dec!(3.33)), line(dec!(4), dec!(0.99))];
        let first = service_totals(dec!(12.3), dec!(2.10), &lines);
        let second = service_totals(dec!(12.3), dec!(2.10), &lines);
        assert_eq!(first, second);
    }
}
