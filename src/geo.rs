// src/geo.rs
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::config::EARTH_RADIUS_KM;

/// Great-circle distance in kilometers between two (latitude, longitude)
/// pairs in degrees, using the haversine formula.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Centroids of the departments the platform operates in, used as a
/// distance fallback for records without coordinates.
pub static DEPARTMENT_CENTROIDS: Lazy<HashMap<&'static str, (f64, f64)>> = Lazy::new(|| {
    HashMap::from([
        ("29", (48.2500, -4.0500)), // Finistère
        ("22", (48.4500, -2.8500)), // Côtes-d'Armor
        ("56", (47.8500, -2.8500)), // Morbihan
        ("35", (48.1500, -1.6500)), // Ille-et-Vilaine
        ("44", (47.3500, -1.7000)), // Loire-Atlantique
        ("49", (47.4000, -0.5500)), // Maine-et-Loire
        ("53", (48.1500, -0.6500)), // Mayenne
        ("72", (47.9500, 0.2200)),  // Sarthe
        ("85", (46.6700, -1.4300)), // Vendée
    ])
});

pub fn department_centroid(department: &str) -> Option<(f64, f64)> {
    DEPARTMENT_CENTROIDS.get(department).copied()
}

/// Departments whose centroid lies within `radius_km` plus the caller's
/// margin of the given point.
pub fn departments_within(lat: f64, lon: f64, radius_km: f64) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = DEPARTMENT_CENTROIDS
        .iter()
        .filter(|(_, (clat, clon))| haversine_km(lat, lon, *clat, *clon) <= radius_km)
        .map(|(code, _)| *code)
        .collect();
    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_symmetric() {
        let d1 = haversine_km(48.8566, 2.3522, 45.7640, 4.8357);
        let d2 = haversine_km(45.7640, 4.8357, 48.8566, 2.3522);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn haversine_paris_lyon() {
        // Paris -> Lyon is roughly 392 km as the crow flies.
        let d = haversine_km(48.8566, 2.3522, 45.7640, 4.8357);
        assert!((d - 392.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_km(47.9960, -4.1003, 47.9960, -4.1003).abs() < 1e-9);
    }

    #[test]
    fn departments_within_includes_home_department() {
        // Quimper sits in Finistère; a tight radius still catches 29.
        let deps = departments_within(47.9960, -4.1003, 60.0);
        assert!(deps.contains(&"29"));
        assert!(!deps.contains(&"72"));
    }
}
