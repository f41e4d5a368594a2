// src/loader.rs
use std::collections::HashSet;

use futures::try_join;
use log::{debug, info};

use crate::config::{QUEUE_CAP, RADIUS_MARGIN_KM};
use crate::db::{self, PgPool};
use crate::error::EngineError;
use crate::geo::departments_within;
use crate::models::{BusinessRecord, CandidateFilters, RankedCandidate, RankingContext};
use crate::normalize::{legal_form_group, normalize_name};
use crate::scoring::{rank, sort_candidates};

/// How many rows to pull from the store before dedup and client-side
/// filtering trim the batch down to the queue cap. One batch per load:
/// a heavily duplicated or legal-form-filtered batch can yield a queue
/// under the cap even while matching candidates remain past the batch
/// boundary; the next reload reaches them once this batch is worked off.
const FETCH_BATCH: i64 = 200;

/// A freshly built work queue plus the total number of untreated records
/// still matching the filters, for progress display.
#[derive(Debug)]
pub struct LoadedPool {
    pub candidates: Vec<RankedCandidate>,
    pub total_remaining: i64,
}

/// Department restriction passed down to the store query. An explicit
/// department filter wins; otherwise a radius filter selects every
/// department whose centroid lies within the radius plus a margin, so
/// near-border departments are not dropped.
pub fn department_set(filters: &CandidateFilters, ctx: &RankingContext) -> Option<Vec<String>> {
    if let Some(dep) = &filters.department {
        return Some(vec![dep.clone()]);
    }
    filters.radius_km.or(ctx.radius_km).map(|radius| {
        departments_within(
            ctx.base.latitude,
            ctx.base.longitude,
            radius + RADIUS_MARGIN_KM,
        )
        .into_iter()
        .map(String::from)
        .collect()
    })
}

/// Drops every record whose `siren` or normalized name was already seen.
/// First occurrence wins. Records with an empty normalized name do not
/// participate in name-based dedup.
pub fn dedup_records(records: Vec<BusinessRecord>) -> Vec<BusinessRecord> {
    let mut seen_sirens: HashSet<String> = HashSet::new();
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let norm = normalize_name(&record.name);
        if seen_sirens.contains(&record.siren) || (!norm.is_empty() && seen_names.contains(&norm)) {
            debug!("Dedup: dropping {} ({})", record.id, record.name);
            continue;
        }
        seen_sirens.insert(record.siren.clone());
        if !norm.is_empty() {
            seen_names.insert(norm);
        }
        out.push(record);
    }
    out
}

/// Pure pool pipeline over an already-fetched batch: client-side
/// legal-form filter, dedup, cap, then score and sort per the context.
pub fn build_queue(
    records: Vec<BusinessRecord>,
    filters: &CandidateFilters,
    ctx: &RankingContext,
) -> Vec<RankedCandidate> {
    let filtered: Vec<BusinessRecord> = match filters.legal_form_group {
        Some(group) => records
            .into_iter()
            .filter(|r| legal_form_group(r.legal_form_code) == Some(group))
            .collect(),
        None => records,
    };
    let mut deduped = dedup_records(filtered);
    deduped.truncate(QUEUE_CAP);
    let mut ranked: Vec<RankedCandidate> = deduped.into_iter().map(|r| rank(r, ctx)).collect();
    sort_candidates(&mut ranked, ctx.mode);
    ranked
}

/// Loads up to [`QUEUE_CAP`] untreated candidates from the store, ranked
/// per the context. The count-only query runs concurrently with the
/// candidate fetch; both are read-only. A store failure surfaces as a
/// [`EngineError::LoadFailure`] and the caller's previous queue must be
/// left in place.
pub async fn load_candidates(
    pool: &PgPool,
    filters: &CandidateFilters,
    ctx: &RankingContext,
) -> Result<LoadedPool, EngineError> {
    let departments = department_set(filters, ctx);
    let headcount_codes = filters.headcount.map(|h| h.code_set());

    let (records, total_remaining) = try_join!(
        db::fetch_untreated(pool, departments.as_deref(), headcount_codes, FETCH_BATCH),
        db::count_untreated(pool, departments.as_deref(), headcount_codes),
    )
    .map_err(EngineError::LoadFailure)?;

    info!(
        "Loader: fetched {} untreated records ({} remaining overall) with filters {:?}",
        records.len(),
        total_remaining,
        filters
    );

    let candidates = build_queue(records, filters, ctx);
    info!("Loader: queue built with {} candidates", candidates.len());
    Ok(LoadedPool {
        candidates,
        total_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrichmentStatus, ReferenceBase, SortMode};

    fn record(id: &str, siren: &str, name: &str) -> BusinessRecord {
        BusinessRecord {
            id: id.into(),
            siren: siren.into(),
            siret: format!("{}00011", siren),
            name: name.into(),
            address: None,
            postal_code: None,
            city: None,
            department: Some("29".into()),
            naf: None,
            headcount_bracket: Some("12".into()),
            legal_form_code: Some(5499),
            latitude: None,
            longitude: None,
            quality_score: 40,
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

    fn ctx(mode: SortMode) -> RankingContext {
        RankingContext {
            base: ReferenceBase {
                name: "Quimper".into(),
                latitude: 47.9960,
                longitude: -4.1003,
            },
            mode,
            radius_km: None,
        }
    }

    #[test]
    fn dedup_drops_repeated_siren_and_keeps_first() {
        let records = vec![
            record("a", "111111111", "Alpha"),
            record("b", "111111111", "Beta"),
            record("c", "222222222", "Gamma"),
        ];
        let out = dedup_records(records);
        let ids: Vec<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn dedup_matches_on_normalized_name() {
        let records = vec![
            record("a", "111111111", "O'Brien & Fils S.A.S."),
            record("b", "222222222", "OBRIEN FILS SAS"),
        ];
        let out = dedup_records(records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }

    #[test]
    fn dedup_ignores_empty_names() {
        let records = vec![
            record("a", "111111111", "..."),
            record("b", "222222222", "---"),
        ];
        assert_eq!(dedup_records(records).len(), 2);
    }

    #[test]
    fn queue_is_capped() {
        let records: Vec<BusinessRecord> = (0..120)
            .map(|i| {
                record(
                    &format!("r{}", i),
                    &format!("{:09}", i),
                    &format!("Entreprise {}", i),
                )
            })
            .collect();
        let out = build_queue(records, &CandidateFilters::default(), &ctx(SortMode::Smart));
        assert_eq!(out.len(), QUEUE_CAP);
    }

    #[test]
    fn legal_form_filter_is_applied_client_side() {
        let mut sas = record("a", "111111111", "Alpha");
        sas.legal_form_code = Some(5710);
        let sarl = record("b", "222222222", "Beta");
        let filters = CandidateFilters {
            legal_form_group: Some(crate::models::LegalFormGroup::SasSasu),
            ..Default::default()
        };
        let out = build_queue(vec![sas, sarl], &filters, &ctx(SortMode::Smart));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].record.id, "a");
    }

    #[test]
    fn explicit_department_filter_wins_over_radius() {
        let filters = CandidateFilters {
            department: Some("35".into()),
            radius_km: Some(30.0),
            ..Default::default()
        };
        assert_eq!(
            department_set(&filters, &ctx(SortMode::Smart)),
            Some(vec!["35".to_string()])
        );
    }

    #[test]
    fn radius_derives_department_set_with_margin() {
        let filters = CandidateFilters {
            radius_km: Some(30.0),
            ..Default::default()
        };
        // 30km + 50km margin around Quimper reaches the Finistère centroid
        // but not Loire-Atlantique.
        let set = department_set(&filters, &ctx(SortMode::Smart)).unwrap();
        assert!(set.contains(&"29".to_string()));
        assert!(!set.contains(&"44".to_string()));
    }

    /// 60 raw records with 5 exact-siren duplicates and 3 name-only
    /// duplicates dedup to exactly 52, each scorable under smart mode
    /// when every record has a department.
    #[test]
    fn sixty_record_pool_dedups_to_fifty_two() {
        let mut records = Vec::new();
        for i in 0..52 {
            records.push(record(
                &format!("r{}", i),
                &format!("{:09}", i),
                &format!("Entreprise {}", i),
            ));
        }
        for i in 0..5 {
            records.push(record(
                &format!("dup-siren-{}", i),
                &format!("{:09}", i),
                &format!("Autre Nom {}", i),
            ));
        }
        for i in 0..3 {
            records.push(record(
                &format!("dup-name-{}", i),
                &format!("9{:08}", i),
                &format!("entreprise {}", i),
            ));
        }
        assert_eq!(records.len(), 60);

        let deduped = dedup_records(records);
        assert_eq!(deduped.len(), 52);

        let c = ctx(SortMode::Smart);
        let ranked: Vec<RankedCandidate> = deduped.into_iter().map(|r| rank(r, &c)).collect();
        assert!(ranked.iter().all(|r| r.ranking_key.is_some()));
    }
}
