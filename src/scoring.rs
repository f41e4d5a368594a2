// src/scoring.rs
use std::cmp::Ordering;

use crate::geo::{department_centroid, haversine_km};
use crate::models::{BusinessRecord, RankedCandidate, RankingContext, SortMode};
use crate::normalize::headcount_proxy;

/// Kilometers from the context base to the record. Records without
/// coordinates fall back to their department centroid; records with
/// neither have no distance.
pub fn distance_from_base(record: &BusinessRecord, ctx: &RankingContext) -> Option<f64> {
    let (lat, lon) = record
        .location()
        .or_else(|| {
            record
                .department_code()
                .and_then(|d| department_centroid(&d))
        })?;
    Some(haversine_km(ctx.base.latitude, ctx.base.longitude, lat, lon))
}

/// Composite "smart" key: rewards headcount and quality, discounts by the
/// square root of the distance. Zero or unknown distance degrades to half
/// the raw blend instead of dividing by zero.
pub fn smart_score(headcount: i64, quality_score: i32, distance_km: Option<f64>) -> f64 {
    let blend = (headcount * 2) as f64 + quality_score as f64;
    match distance_km {
        Some(d) if d > 0.0 => blend / d.sqrt(),
        _ => blend * 0.5,
    }
}

/// Annotates a record with its distance and the ranking key for the
/// context's sort mode.
pub fn rank(record: BusinessRecord, ctx: &RankingContext) -> RankedCandidate {
    let distance_km = distance_from_base(&record, ctx);
    let proxy = headcount_proxy(record.headcount_bracket.as_deref());
    let ranking_key = match ctx.mode {
        SortMode::Smart => Some(smart_score(proxy, record.quality_score, distance_km)),
        SortMode::Proche => distance_km,
        SortMode::Gros => Some(proxy as f64),
        SortMode::Score => Some(record.quality_score as f64),
    };
    RankedCandidate {
        record,
        distance_km,
        ranking_key,
    }
}

/// Orders ranked candidates per the sort mode. The sort is stable, so
/// exact ties preserve input order.
pub fn sort_candidates(candidates: &mut [RankedCandidate], mode: SortMode) {
    match mode {
        // Ascending by distance; unknown distance sorts last.
        SortMode::Proche => candidates.sort_by(|a, b| match (a.distance_km, b.distance_km) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        // Descending by key for every other mode.
        _ => candidates.sort_by(|a, b| {
            let ka = a.ranking_key.unwrap_or(f64::NEG_INFINITY);
            let kb = b.ranking_key.unwrap_or(f64::NEG_INFINITY);
            kb.partial_cmp(&ka).unwrap_or(Ordering::Equal)
        }),
    }
}
