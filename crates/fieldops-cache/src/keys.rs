//! Cache key constants and builders
//!
//! Standardized key naming for cached catalog data, preventing collisions
//! between entity types.
//!
//! # Key Patterns
//!
//! - `city:{city_id}` - Cached city catalog entry
//! - `city:name:{name}` - City lookup by lowercased name
//! - `material:{material_id}` - Cached material catalog entry
//! - `materials:active` - Cached list of active materials
//!
//! # Example
//!
//! ```
//! use fieldops_cache::keys;
//!
//! let key = keys::city_key(12);
//! assert_eq!(key, "city:12");
//! ```

/// Prefix for cached city entries
///
/// Format: `city:{city_id}` or `city:name:{name}`
pub const CITY_PREFIX: &str = "city";

/// Prefix for cached material entries
///
/// Format: `material:{material_id}`
pub const MATERIAL_PREFIX: &str = "material";

/// Key for the cached active-material list
pub const ACTIVE_MATERIALS_KEY: &str = "materials:active";

/// Default TTL for city entries (10 minutes; rates change rarely)
pub const CITY_TTL_SECS: u64 = 600;

/// Default TTL for material entries (5 minutes; prices change during the day)
pub const MATERIAL_TTL_SECS: u64 = 300;

/// Default TTL for the active-material list (5 minutes)
pub const ACTIVE_MATERIALS_TTL_SECS: u64 = 300;

/// Build a cache key for a city by ID
pub fn city_key(city_id: i32) -> String {
    format!("{}:{}", CITY_PREFIX, city_id)
}

/// Build a cache key for a city by name
///
/// Names are lowercased so lookups are case-insensitive, matching the
/// database lookup.
pub fn city_name_key(name: &str) -> String {
    format!("{}:name:{}", CITY_PREFIX, name.to_lowercase())
}

/// Build a cache key for a material by ID
pub fn material_key(material_id: i32) -> String {
    format!("{}:{}", MATERIAL_PREFIX, material_id)
}

/// Build a pattern for matching all keys with a given prefix
///
/// # Warning
///
/// Scanning keys can be expensive on large datasets. Prefer targeted
/// deletes when the key is known.
pub fn pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_key() {
        assert_eq!(city_key(12), "city:12");
        assert_eq!(city_key(0), "city:0");
    }

    #[test]
    fn test_city_name_key_is_case_insensitive() {
        assert_eq!(city_name_key("Curitiba"), "city:name:curitiba");
        assert_eq!(city_name_key("CURITIBA"), city_name_key("curitiba"));
    }

    #[test]
    fn test_material_key() {
        assert_eq!(material_key(7), "material:7");
    }

    #[test]
    fn test_pattern() {
        assert_eq!(pattern(CITY_PREFIX), "city:*");
        assert_eq!(pattern(MATERIAL_PREFIX), "material:*");
    }

    #[test]
    fn test_key_uniqueness() {
        let keys = vec![city_key(1), material_key(1), city_name_key("1")];

        let unique_count = keys.iter().collect::<std::collections::HashSet<_>>().len();
        assert_eq!(unique_count, keys.len());
    }
}
