// src/commit.rs
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::{is_placeholder, ATTEMPTS_SENTINEL};
use crate::db::{self, PgPool};
use crate::error::EngineError;
use crate::models::{BusinessRecord, Correction, EnrichmentStatus};
use crate::normalize::{department_from_postal, normalize_email, normalize_phone};

/// Provenance of a committed email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailSource {
    /// Matches one of the patterns previously suggested for the record.
    KnownPattern,
    /// Typed in by the operator.
    Manual,
}

/// Fields a commit writes to one store row. `None` means the column is
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub department: Option<String>,
    pub address: Option<String>,
    pub siren: Option<String>,
    pub siret: Option<String>,
    pub enrichment_status: Option<EnrichmentStatus>,
    pub enrichment_attempts: Option<i32>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.email.is_none()
            && self.website.is_none()
            && self.name.is_none()
            && self.city.is_none()
            && self.postal_code.is_none()
            && self.department.is_none()
            && self.address.is_none()
            && self.siren.is_none()
            && self.siret.is_none()
            && self.enrichment_status.is_none()
            && self.enrichment_attempts.is_none()
            && self.last_attempt_at.is_none()
    }
}

/// Result of planning a commit against a record.
#[derive(Debug)]
pub enum CommitPlan {
    /// No contact field supplied: the queue advances, nothing is written.
    Skip,
    Save {
        patch: RecordPatch,
        email_source: Option<EmailSource>,
        /// Name the duplicate fan-out matches on (case-insensitive exact
        /// equality, the stricter key, deliberately not the normalized
        /// dedup key).
        propagation_name: String,
        /// Contact values duplicates must carry after the commit.
        contact: ContactFields,
    },
}

/// Effective post-commit contact values, propagated to duplicates.
#[derive(Debug, Clone, Default)]
pub struct ContactFields {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
}

/// Outcome of a commit, reported to the caller. A successful primary
/// write is authoritative even when the duplicate fan-out partially or
/// fully failed.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    pub saved: bool,
    pub email_source: Option<EmailSource>,
    pub duplicates_updated: usize,
    pub propagation_failures: usize,
}

/// Plans a commit: which columns change, with what values, and what gets
/// propagated. Pure; all store access happens in [`commit`].
pub fn plan_commit(record: &BusinessRecord, correction: &Correction, now: DateTime<Utc>) -> CommitPlan {
    if correction.is_skip() {
        return CommitPlan::Skip;
    }

    let mut patch = RecordPatch::default();
    let mut email_source = None;

    if let Some(raw) = correction.phone.as_deref().filter(|s| !s.trim().is_empty()) {
        patch.phone = Some(normalize_phone(raw));
    }
    if let Some(raw) = correction.email.as_deref().filter(|s| !s.trim().is_empty()) {
        let email = normalize_email(raw);
        email_source = Some(
            if correction
                .suggested_emails
                .iter()
                .any(|s| normalize_email(s) == email)
            {
                EmailSource::KnownPattern
            } else {
                EmailSource::Manual
            },
        );
        patch.email = Some(email);
    }
    if let Some(raw) = correction
        .website
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        patch.website = Some(raw.trim().to_string());
    }

    // Identity fields only when they actually differ from the stored value.
    if let Some(name) = differing(correction.name.as_deref(), Some(record.name.as_str())) {
        patch.name = Some(name);
    }
    if let Some(city) = differing(correction.city.as_deref(), record.city.as_deref()) {
        patch.city = Some(city);
    }
    if let Some(postal) = differing(correction.postal_code.as_deref(), record.postal_code.as_deref())
    {
        patch.department = department_from_postal(&postal);
        patch.postal_code = Some(postal);
    }
    if let Some(address) = differing(correction.address.as_deref(), record.address.as_deref()) {
        patch.address = Some(address);
    }

    // A placeholder identifier may be replaced by a real one supplied by
    // the operator. Accepted from 9 characters on, without checksum
    // validation: operators are trusted. This is the only path by which
    // the primary identifier changes.
    if is_placeholder(&record.siren) {
        if let Some(siren) = correction
            .siren
            .as_deref()
            .map(str::trim)
            .filter(|s| s.len() >= 9)
        {
            patch.siren = Some(siren.to_string());
        }
    }
    if is_placeholder(&record.siret) {
        if let Some(siret) = correction
            .siret
            .as_deref()
            .map(str::trim)
            .filter(|s| s.len() >= 9)
        {
            patch.siret = Some(siret.to_string());
        }
    }

    patch.enrichment_status = Some(EnrichmentStatus::Done);
    patch.enrichment_attempts = Some(ATTEMPTS_SENTINEL);
    patch.last_attempt_at = Some(now);

    let contact = ContactFields {
        phone: patch.phone.clone().or_else(|| record.phone.clone()),
        email: patch.email.clone().or_else(|| record.email.clone()),
        website: patch.website.clone().or_else(|| record.website.clone()),
    };
    let propagation_name = patch.name.clone().unwrap_or_else(|| record.name.clone());

    CommitPlan::Save {
        patch,
        email_source,
        propagation_name,
        contact,
    }
}

fn differing(candidate: Option<&str>, current: Option<&str>) -> Option<String> {
    let value = candidate.map(str::trim).filter(|s| !s.is_empty())?;
    if Some(value) == current.map(str::trim) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Patch for the duplicate fan-out: contact fields plus terminal status.
fn propagation_patch(contact: &ContactFields, now: DateTime<Utc>) -> RecordPatch {
    RecordPatch {
        phone: contact.phone.clone(),
        email: contact.email.clone(),
        website: contact.website.clone(),
        enrichment_status: Some(EnrichmentStatus::Done),
        enrichment_attempts: Some(ATTEMPTS_SENTINEL),
        last_attempt_at: Some(now),
        ..Default::default()
    }
}

/// Patch marking a record "not found": terminal failure, contact fields
/// untouched.
pub fn plan_exclude(now: DateTime<Utc>) -> RecordPatch {
    RecordPatch {
        enrichment_status: Some(EnrichmentStatus::Failed),
        enrichment_attempts: Some(ATTEMPTS_SENTINEL),
        last_attempt_at: Some(now),
        ..Default::default()
    }
}

/// Applies a correction to the record and fans the contact fields out to
/// same-named duplicates. The primary write must succeed before
/// propagation is attempted; propagation failures are logged and counted
/// but never roll back or mask the primary commit.
pub async fn commit(
    pool: &PgPool,
    record: &BusinessRecord,
    correction: &Correction,
) -> Result<CommitOutcome, EngineError> {
    let now = Utc::now();
    let (patch, email_source, propagation_name, contact) =
        match plan_commit(record, correction, now) {
            CommitPlan::Skip => {
                debug!("Commit: no contact field supplied for {}, skipping", record.id);
                return Ok(CommitOutcome::default());
            }
            CommitPlan::Save {
                patch,
                email_source,
                propagation_name,
                contact,
            } => (patch, email_source, propagation_name, contact),
        };

    db::update_record(pool, &record.id, &patch)
        .await
        .map_err(|source| EngineError::CommitFailure {
            record_id: record.id.clone(),
            source,
        })?;
    info!(
        "Commit: saved record {} ({}){}",
        record.id,
        record.name,
        correction
            .entered_by
            .as_deref()
            .map(|by| format!(" entered by {}", by))
            .unwrap_or_default()
    );

    let mut outcome = CommitOutcome {
        saved: true,
        email_source,
        ..Default::default()
    };

    // Best-effort fan-out. Not transactional: a sibling left behind here
    // is reconciled by a later operator pass.
    match db::fetch_duplicates_by_name(pool, &propagation_name, &record.id).await {
        Ok(duplicates) => {
            let dup_patch = propagation_patch(&contact, now);
            for dup in duplicates {
                match db::update_record(pool, &dup.id, &dup_patch).await {
                    Ok(()) => outcome.duplicates_updated += 1,
                    Err(e) => {
                        outcome.propagation_failures += 1;
                        warn!(
                            "Commit: propagation to duplicate {} of {} failed: {}",
                            dup.id, record.id, e
                        );
                    }
                }
            }
        }
        Err(e) => {
            outcome.propagation_failures += 1;
            warn!(
                "Commit: duplicate lookup for '{}' failed after primary save of {}: {}",
                propagation_name, record.id, e
            );
        }
    }

    if outcome.duplicates_updated > 0 || outcome.propagation_failures > 0 {
        info!(
            "Commit: propagated contact fields to {} duplicates ({} failures)",
            outcome.duplicates_updated, outcome.propagation_failures
        );
    }
    Ok(outcome)
}

/// Marks a record as not-found. Terminal: status `failed`, attempts at
/// the sentinel, no contact mutation, no duplicate propagation.
pub async fn exclude(pool: &PgPool, record: &BusinessRecord) -> Result<(), EngineError> {
    let patch = plan_exclude(Utc::now());
    db::update_record(pool, &record.id, &patch)
        .await
        .map_err(|source| EngineError::CommitFailure {
            record_id: record.id.clone(),
            source,
        })?;
    info!("Exclude: record {} marked failed/{}", record.id, ATTEMPTS_SENTINEL);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BusinessRecord {
        BusinessRecord {
            id: "r1".into(),
            siren: "552100554".into(),
            siret: "55210055400013".into(),
            name: "Menuiserie Le Goff".into(),
            address: Some("4 rue de la Gare".into()),
            postal_code: Some("29000".into()),
            city: Some("Quimper".into()),
            department: Some("29".into()),
            naf: None,
            headcount_bracket: Some("11".into()),
            legal_form_code: Some(5499),
            latitude: None,
            longitude: None,
            quality_score: 55,
            phone: None,
            email: None,
            website: Some("https://legoff.example".into()),
            enrichment_status: Some(EnrichmentStatus::Enriching),
            enrichment_attempts: 2,
            last_attempt_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn empty_correction_is_a_skip() {
        let plan = plan_commit(&record(), &Correction::default(), now());
        assert!(matches!(plan, CommitPlan::Skip));
    }

    #[test]
    fn identity_only_correction_is_still_a_skip() {
        let correction = Correction {
            name: Some("Nouveau Nom".into()),
            city: Some("Brest".into()),
            ..Default::default()
        };
        assert!(matches!(
            plan_commit(&record(), &correction, now()),
            CommitPlan::Skip
        ));
    }

    #[test]
    fn save_sets_terminal_done_status() {
        let correction = Correction {
            phone: Some("02 98 00 00 00".into()),
            ..Default::default()
        };
        match plan_commit(&record(), &correction, now()) {
            CommitPlan::Save { patch, .. } => {
                assert_eq!(patch.phone.as_deref(), Some("02 98 00 00 00"));
                assert_eq!(patch.enrichment_status, Some(EnrichmentStatus::Done));
                assert_eq!(patch.enrichment_attempts, Some(ATTEMPTS_SENTINEL));
                assert!(patch.last_attempt_at.is_some());
            }
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn phone_is_normalized_on_save() {
        let correction = Correction {
            phone: Some("+33298123456".into()),
            ..Default::default()
        };
        match plan_commit(&record(), &correction, now()) {
            CommitPlan::Save { patch, .. } => {
                assert_eq!(patch.phone.as_deref(), Some("02 98 12 34 56"));
            }
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn email_provenance_is_tagged() {
        let base = record();
        let mut correction = Correction {
            email: Some("Contact@LeGoff.FR".into()),
            suggested_emails: vec!["contact@legoff.fr".into()],
            ..Default::default()
        };
        match plan_commit(&base, &correction, now()) {
            CommitPlan::Save {
                patch,
                email_source,
                ..
            } => {
                assert_eq!(patch.email.as_deref(), Some("contact@legoff.fr"));
                assert_eq!(email_source, Some(EmailSource::KnownPattern));
            }
            CommitPlan::Skip => panic!("expected a save"),
        }

        correction.suggested_emails.clear();
        match plan_commit(&base, &correction, now()) {
            CommitPlan::Save { email_source, .. } => {
                assert_eq!(email_source, Some(EmailSource::Manual));
            }
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn identity_fields_apply_only_when_different() {
        let correction = Correction {
            phone: Some("0298123456".into()),
            name: Some("Menuiserie Le Goff".into()), // unchanged
            city: Some("Brest".into()),              // changed
            postal_code: Some("29200".into()),       // changed
            ..Default::default()
        };
        match plan_commit(&record(), &correction, now()) {
            CommitPlan::Save { patch, .. } => {
                assert!(patch.name.is_none());
                assert_eq!(patch.city.as_deref(), Some("Brest"));
                assert_eq!(patch.postal_code.as_deref(), Some("29200"));
                // Department re-derived from the new postal code.
                assert_eq!(patch.department.as_deref(), Some("29"));
            }
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn multibyte_postal_code_is_stored_as_entered() {
        // Operator input is never rejected; a non-ASCII postal code must
        // not abort the commit on a byte boundary.
        let correction = Correction {
            phone: Some("0298123456".into()),
            postal_code: Some("€9000".into()),
            ..Default::default()
        };
        match plan_commit(&record(), &correction, now()) {
            CommitPlan::Save { patch, .. } => {
                assert_eq!(patch.postal_code.as_deref(), Some("€9000"));
                assert_eq!(patch.department.as_deref(), Some("€9"));
            }
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn placeholder_siren_replacement() {
        let mut r = record();
        r.siren = "MANU-1712345".into();
        r.siret = "MANU-1712345-001".into();
        let correction = Correction {
            phone: Some("0298123456".into()),
            siren: Some("123456789".into()),
            siret: Some("12345678900011".into()),
            ..Default::default()
        };
        match plan_commit(&r, &correction, now()) {
            CommitPlan::Save { patch, .. } => {
                assert_eq!(patch.siren.as_deref(), Some("123456789"));
                assert_eq!(patch.siret.as_deref(), Some("12345678900011"));
            }
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn real_siren_is_never_replaced() {
        let correction = Correction {
            phone: Some("0298123456".into()),
            siren: Some("999999999".into()),
            ..Default::default()
        };
        match plan_commit(&record(), &correction, now()) {
            CommitPlan::Save { patch, .. } => assert!(patch.siren.is_none()),
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn short_replacement_value_is_ignored() {
        let mut r = record();
        r.siren = "MANU-1712345".into();
        let correction = Correction {
            phone: Some("0298123456".into()),
            siren: Some("12345678".into()), // 8 chars, below the floor
            ..Default::default()
        };
        match plan_commit(&r, &correction, now()) {
            CommitPlan::Save { patch, .. } => assert!(patch.siren.is_none()),
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn propagated_contact_merges_new_and_existing_values() {
        // Website stays from the record, phone comes from the correction.
        let correction = Correction {
            phone: Some("0298123456".into()),
            ..Default::default()
        };
        match plan_commit(&record(), &correction, now()) {
            CommitPlan::Save { contact, .. } => {
                assert_eq!(contact.phone.as_deref(), Some("02 98 12 34 56"));
                assert!(contact.email.is_none());
                assert_eq!(contact.website.as_deref(), Some("https://legoff.example"));
            }
            CommitPlan::Skip => panic!("expected a save"),
        }
    }

    #[test]
    fn exclude_never_touches_contact_fields() {
        let patch = plan_exclude(now());
        assert_eq!(patch.enrichment_status, Some(EnrichmentStatus::Failed));
        assert_eq!(patch.enrichment_attempts, Some(ATTEMPTS_SENTINEL));
        assert!(patch.phone.is_none());
        assert!(patch.email.is_none());
        assert!(patch.website.is_none());
        assert!(patch.name.is_none());
    }
}
