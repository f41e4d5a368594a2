// src/config.rs
use crate::models::ReferenceBase;

/// Maximum number of records surfaced in one work queue after dedup.
pub const QUEUE_CAP: usize = 50;

/// Margin added to the radius filter when deriving the department set,
/// so near-border departments are not excluded by their centroid alone.
pub const RADIUS_MARGIN_KM: f64 = 50.0;

/// Sentinel on `enrichment_attempts` meaning "manually resolved, excluded
/// from automatic retry".
pub const ATTEMPTS_SENTINEL: i32 = 99;

/// Earth radius used by the haversine computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Headcount proxy applied when the bracket code is missing or unknown.
pub const DEFAULT_HEADCOUNT_PROXY: i64 = 5;

/// Prefix marking a manually-assigned SIREN/SIRET placeholder. Bulk import
/// never produces such values.
pub const PLACEHOLDER_PREFIX: &str = "MANU";

/// Reads the reference base from `BASE_NAME`/`BASE_LAT`/`BASE_LON`,
/// defaulting to the Quimper training center.
pub fn default_base() -> ReferenceBase {
    let name = std::env::var("BASE_NAME").unwrap_or_else(|_| "Quimper".to_string());
    let latitude = std::env::var("BASE_LAT")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(47.9960);
    let longitude = std::env::var("BASE_LON")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(-4.1003);
    ReferenceBase {
        name,
        latitude,
        longitude,
    }
}

/// True when an identifier is a synthetic stand-in for a manually-entered
/// business lacking official registry data.
pub fn is_placeholder(identifier: &str) -> bool {
    identifier.starts_with(PLACEHOLDER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder("MANU-1712345"));
        assert!(!is_placeholder("552100554"));
    }
}
