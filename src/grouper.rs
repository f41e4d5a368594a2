// src/grouper.rs
use std::collections::HashSet;

use crate::models::{BusinessRecord, ContactStrategy};

/// Contact-strategy recommendation for the establishments sharing one
/// SIREN. Advisory metadata only; the policy's asymmetry is intentional:
/// spread-out groups get called site by site, while a two-establishment
/// single-city group warrants a check before assuming a headquarters.
/// Returns None for groups of fewer than two establishments, which are
/// never classified.
pub fn classify(establishments: &[BusinessRecord]) -> Option<ContactStrategy> {
    if establishments.len() < 2 {
        return None;
    }
    let distinct_cities: HashSet<String> = establishments
        .iter()
        .filter_map(|e| e.city.as_deref())
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    Some(if distinct_cities.len() > 1 {
        ContactStrategy::CallAll
    } else if establishments.len() == 2 {
        ContactStrategy::VerifyFirst
    } else {
        ContactStrategy::CallSiegeOnly
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnrichmentStatus;

    fn establishment(id: &str, city: &str) -> BusinessRecord {
        BusinessRecord {
            id: id.into(),
            siren: "552100554".into(),
            siret: format!("552100554000{}", id),
            name: "Groupe Kerviel".into(),
            address: None,
            postal_code: None,
            city: Some(city.into()),
            department: None,
            naf: None,
            headcount_bracket: None,
            legal_form_code: None,
            latitude: None,
            longitude: None,
            quality_score: 0,
            phone: None,
            email: None,
            website: None,
            enrichment_status: Some(EnrichmentStatus::Pending),
            enrichment_attempts: 0,
            last_attempt_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn three_same_city_means_call_headquarters() {
        let group = vec![
            establishment("11", "Paris"),
            establishment("12", "Paris"),
            establishment("13", "Paris"),
        ];
        assert_eq!(classify(&group), Some(ContactStrategy::CallSiegeOnly));
    }

    #[test]
    fn two_same_city_means_verify_first() {
        let group = vec![establishment("11", "Paris"), establishment("12", "Paris")];
        assert_eq!(classify(&group), Some(ContactStrategy::VerifyFirst));
    }

    #[test]
    fn multiple_cities_means_call_all() {
        let group = vec![establishment("11", "Paris"), establishment("12", "Lyon")];
        assert_eq!(classify(&group), Some(ContactStrategy::CallAll));
    }

    #[test]
    fn city_comparison_ignores_case_and_spacing() {
        let group = vec![
            establishment("11", "Paris"),
            establishment("12", " paris "),
            establishment("13", "PARIS"),
        ];
        assert_eq!(classify(&group), Some(ContactStrategy::CallSiegeOnly));
    }

    #[test]
    fn singleton_group_is_never_classified() {
        let group = vec![establishment("11", "Paris")];
        assert_eq!(classify(&group), None);
    }
}
