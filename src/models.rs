// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a prospect in the enrichment queue. Transitions are driven
/// solely by operator actions: `Pending -> Enriching -> {Done | Failed}`.
/// `Done` records are never re-surfaced by the automatic queue; `Failed`
/// with the attempts sentinel is terminal ("excluded").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Pending,
    Enriching,
    Done,
    Failed,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Enriching => "enriching",
            EnrichmentStatus::Done => "done",
            EnrichmentStatus::Failed => "failed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EnrichmentStatus::Pending),
            "enriching" => Some(EnrichmentStatus::Enriching),
            "done" => Some(EnrichmentStatus::Done),
            "failed" => Some(EnrichmentStatus::Failed),
            _ => None,
        }
    }
}

/// One row per establishment. `siren` groups establishments of the same
/// legal entity; `siret` identifies the establishment itself. Both may be
/// placeholder values when the record was created by hand rather than by
/// bulk import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub id: String,
    pub siren: String,
    pub siret: String,
    pub name: String,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub department: Option<String>,
    pub naf: Option<String>,
    pub headcount_bracket: Option<String>,
    pub legal_form_code: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub quality_score: i32,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub enrichment_status: Option<EnrichmentStatus>,
    pub enrichment_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BusinessRecord {
    /// Department code, falling back to the first two characters of the
    /// postal code when no explicit department field is stored.
    pub fn department_code(&self) -> Option<String> {
        match self.department.as_deref() {
            Some(d) if !d.is_empty() => Some(d.to_string()),
            _ => self
                .postal_code
                .as_deref()
                .and_then(crate::normalize::department_from_postal),
        }
    }

    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Ordering mode for the candidate queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Composite of headcount, quality score and proximity.
    Smart,
    /// Nearest first.
    Proche,
    /// Largest headcount first.
    Gros,
    /// Highest stored quality score first.
    Score,
}

/// Named reference point the distance computation anchors on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceBase {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Filters an operator can apply to the candidate pool. All optional;
/// `legal_form_group` is applied client-side after the fetch since the
/// store has no derived column for it.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilters {
    pub department: Option<String>,
    pub headcount: Option<HeadcountFilter>,
    pub legal_form_group: Option<LegalFormGroup>,
    pub radius_km: Option<f64>,
}

/// Operator-facing headcount brackets, each backed by a set of store codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HeadcountFilter {
    /// No declared employees.
    Aucun,
    /// 1 to 9 employees.
    #[value(name = "1-9")]
    De1A9,
    /// 10 to 49 employees.
    #[value(name = "10-49")]
    De10A49,
    /// 50 to 199 employees.
    #[value(name = "50-199")]
    De50A199,
    /// 200 employees and above.
    #[value(name = "200+")]
    Plus200,
}

impl HeadcountFilter {
    pub fn code_set(&self) -> &'static [&'static str] {
        match self {
            HeadcountFilter::Aucun => &["00"],
            HeadcountFilter::De1A9 => &["01", "02", "03"],
            HeadcountFilter::De10A49 => &["11", "12"],
            HeadcountFilter::De50A199 => &["21", "22"],
            HeadcountFilter::Plus200 => &["31", "32", "41", "42", "51", "52", "53"],
        }
    }
}

/// Legal-form buckets derived from the numeric INSEE category code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum LegalFormGroup {
    #[value(name = "sas")]
    SasSasu,
    #[value(name = "sarl")]
    SarlEurl,
    #[value(name = "sa")]
    SaSca,
    #[value(name = "ei")]
    Ei,
    #[value(name = "association")]
    Association,
    #[value(name = "public")]
    Public,
    #[value(name = "autre")]
    Autre,
}

impl LegalFormGroup {
    pub fn label(&self) -> &'static str {
        match self {
            LegalFormGroup::SasSasu => "SAS/SASU",
            LegalFormGroup::SarlEurl => "SARL/EURL",
            LegalFormGroup::SaSca => "SA/SCA",
            LegalFormGroup::Ei => "EI",
            LegalFormGroup::Association => "Association",
            LegalFormGroup::Public => "Public",
            LegalFormGroup::Autre => "Autre",
        }
    }
}

/// Ephemeral per-query ranking parameters. Created for one load, discarded
/// after use.
#[derive(Debug, Clone)]
pub struct RankingContext {
    pub base: ReferenceBase,
    pub mode: SortMode,
    pub radius_km: Option<f64>,
}

/// A pool record annotated with its computed distance and ranking key.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCandidate {
    pub record: BusinessRecord,
    /// Kilometers from the reference base; None when neither coordinates
    /// nor a known department centroid are available.
    pub distance_km: Option<f64>,
    pub ranking_key: Option<f64>,
}

/// Operator-entered correction. Only fields actually supplied are `Some`;
/// an entirely contact-less correction is a skip, not a save.
#[derive(Debug, Clone, Default)]
pub struct Correction {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub siren: Option<String>,
    pub siret: Option<String>,
    /// Who or what entered the correction.
    pub entered_by: Option<String>,
    /// Email patterns previously suggested for this record; used to tag
    /// the provenance of the committed email.
    pub suggested_emails: Vec<String>,
}

impl Correction {
    /// A correction with no contact field at all never mutates the store.
    pub fn is_skip(&self) -> bool {
        self.phone.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.email.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.website.as_deref().map_or(true, |s| s.trim().is_empty())
    }
}

/// Contact strategy for a multi-establishment group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStrategy {
    CallAll,
    CallSiegeOnly,
    VerifyFirst,
}

impl ContactStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStrategy::CallAll => "call_all",
            ContactStrategy::CallSiegeOnly => "call_siege_only",
            ContactStrategy::VerifyFirst => "verify_first",
        }
    }
}
