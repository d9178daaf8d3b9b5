//! City catalog model
//!
//! Cities carry the per-kilometer displacement rate used by the billing
//! calculator. The rate is read at calculation time, never snapshotted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// City entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    pub id: i32,
    pub name: String,
    /// Two-letter state code
    pub state: String,
    /// Billed value per traveled kilometer
    pub km_rate: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_city_serialization() {
        let city = City {
            id: 1,
            name: "Curitiba".to_string(),
            state: "PR".to_string(),
            km_rate: dec!(2.50),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&city).unwrap();
        assert!(json.contains("\"km_rate\":\"2.50\""));
        assert!(json.contains("\"state\":\"PR\""));
    }
}
