// src/main.rs
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use uuid::Uuid;

use prospection_lib::commit::{commit, exclude, EmailSource};
use prospection_lib::config::{self, PLACEHOLDER_PREFIX};
use prospection_lib::db;
use prospection_lib::grouper::classify;
use prospection_lib::load_env;
use prospection_lib::loader::load_candidates;
use prospection_lib::models::{
    BusinessRecord, CandidateFilters, Correction, EnrichmentStatus, HeadcountFilter,
    LegalFormGroup, RankingContext, SortMode,
};

#[derive(Parser)]
#[command(
    name = "prospection",
    about = "Prospect ranking and enrichment queue engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build and display the ranked candidate queue.
    Queue {
        /// Restrict to one department code (e.g. 29).
        #[arg(long)]
        department: Option<String>,
        /// Headcount bracket filter.
        #[arg(long)]
        headcount: Option<HeadcountFilter>,
        /// Legal-form group filter (applied after the fetch).
        #[arg(long)]
        legal_form: Option<LegalFormGroup>,
        /// Radius in kilometers around the base; derives the department
        /// set when no explicit department is given.
        #[arg(long)]
        radius: Option<f64>,
        /// Sort mode.
        #[arg(long, value_enum, default_value_t = SortMode::Smart)]
        sort: SortMode,
        /// Emit the queue as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Apply an operator correction to a record and propagate contact
    /// fields to same-named duplicates.
    Commit {
        /// Store key of the record.
        id: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// Real SIREN replacing a placeholder one.
        #[arg(long)]
        siren: Option<String>,
        /// Real SIRET replacing a placeholder one.
        #[arg(long)]
        siret: Option<String>,
        /// Operator identifier recorded as provenance.
        #[arg(long)]
        operator: Option<String>,
    },
    /// Mark a record as not-found: terminal failure, no contact mutation.
    Exclude { id: String },
    /// Recommend a contact strategy for the establishments sharing a SIREN.
    Classify { siren: String },
    /// Search records by name (the queue's escape hatch).
    Search { term: String },
    /// Insert a manually-created record with placeholder identifiers.
    Create {
        name: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let cli = Cli::parse();
    let pool = db::connect().await.context("Failed to connect to the record store")?;

    match cli.command {
        Command::Queue {
            department,
            headcount,
            legal_form,
            radius,
            sort,
            json,
        } => {
            let filters = CandidateFilters {
                department,
                headcount,
                legal_form_group: legal_form,
                radius_km: radius,
            };
            let ctx = RankingContext {
                base: config::default_base(),
                mode: sort,
                radius_km: radius,
            };
            run_queue(&pool, filters, ctx, json).await
        }
        Command::Commit {
            id,
            phone,
            email,
            website,
            name,
            city,
            postal_code,
            address,
            siren,
            siret,
            operator,
        } => {
            let correction = Correction {
                phone,
                email,
                website,
                name,
                city,
                postal_code,
                address,
                siren,
                siret,
                entered_by: operator,
                suggested_emails: Vec::new(),
            };
            run_commit(&pool, &id, correction).await
        }
        Command::Exclude { id } => {
            let record = require_record(&pool, &id).await?;
            exclude(&pool, &record).await?;
            println!("Record {} excluded (failed, terminal)", id);
            Ok(())
        }
        Command::Classify { siren } => run_classify(&pool, &siren).await,
        Command::Search { term } => run_search(&pool, &term).await,
        Command::Create {
            name,
            city,
            postal_code,
            address,
        } => run_create(&pool, name, city, postal_code, address).await,
    }
}

async fn require_record(pool: &db::PgPool, id: &str) -> Result<BusinessRecord> {
    match db::fetch_record(pool, id).await? {
        Some(record) => Ok(record),
        None => bail!("No record with id {}", id),
    }
}

async fn run_queue(
    pool: &db::PgPool,
    filters: CandidateFilters,
    ctx: RankingContext,
    json: bool,
) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(format!(
        "Loading candidates around {} ({:?} mode)...",
        ctx.base.name, ctx.mode
    ));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let loaded = load_candidates(pool, &filters, &ctx).await?;
    spinner.finish_and_clear();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&loaded.candidates)
                .context("Failed to serialize queue")?
        );
        return Ok(());
    }

    println!(
        "{} candidates queued, {} untreated records remaining overall",
        loaded.candidates.len(),
        loaded.total_remaining
    );
    println!(
        "{:<12} {:<30} {:<10} {:>9} {:>10}",
        "ID", "NAME", "CITY", "DIST(KM)", "KEY"
    );
    for candidate in &loaded.candidates {
        let r = &candidate.record;
        println!(
            "{:<12} {:<30} {:<10} {:>9} {:>10}",
            r.id,
            truncate(&r.name, 30),
            truncate(r.city.as_deref().unwrap_or("-"), 10),
            candidate
                .distance_km
                .map(|d| format!("{:.1}", d))
                .unwrap_or_else(|| "-".to_string()),
            candidate
                .ranking_key
                .map(|k| format!("{:.2}", k))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

async fn run_commit(pool: &db::PgPool, id: &str, correction: Correction) -> Result<()> {
    let record = require_record(pool, id).await?;
    let outcome = commit(pool, &record, &correction).await?;
    if !outcome.saved {
        println!("No contact field supplied: skip, nothing written");
        return Ok(());
    }
    println!("Record {} saved (done/{})", id, config::ATTEMPTS_SENTINEL);
    if let Some(source) = outcome.email_source {
        println!(
            "Email provenance: {}",
            match source {
                EmailSource::KnownPattern => "known pattern",
                EmailSource::Manual => "manually entered",
            }
        );
    }
    if outcome.duplicates_updated > 0 {
        println!("Contact fields propagated to {} duplicates", outcome.duplicates_updated);
    }
    if outcome.propagation_failures > 0 {
        println!(
            "WARNING: {} duplicate updates failed; primary save is unaffected",
            outcome.propagation_failures
        );
    }
    Ok(())
}

async fn run_classify(pool: &db::PgPool, siren: &str) -> Result<()> {
    let establishments = db::fetch_group(pool, siren).await?;
    println!("{} establishments for SIREN {}", establishments.len(), siren);
    for e in &establishments {
        println!("  {:<16} {:<30} {}", e.siret, truncate(&e.name, 30), e.city.as_deref().unwrap_or("-"));
    }
    match classify(&establishments) {
        Some(strategy) => println!("Recommendation: {}", strategy.as_str()),
        None => println!("Single establishment: no recommendation"),
    }
    Ok(())
}

async fn run_search(pool: &db::PgPool, term: &str) -> Result<()> {
    let records = db::search_by_name(pool, term, 20).await?;
    if records.is_empty() {
        println!("No record matching '{}'", term);
        return Ok(());
    }
    for r in &records {
        println!(
            "{:<12} {:<30} {:<10} {}",
            r.id,
            truncate(&r.name, 30),
            r.city.as_deref().unwrap_or("-"),
            r.enrichment_status
                .map(|s| s.as_str())
                .unwrap_or("untreated")
        );
    }
    Ok(())
}

async fn run_create(
    pool: &db::PgPool,
    name: String,
    city: Option<String>,
    postal_code: Option<String>,
    address: Option<String>,
) -> Result<()> {
    let suffix = Uuid::new_v4().simple().to_string();
    let department = postal_code
        .as_deref()
        .and_then(prospection_lib::normalize::department_from_postal);
    let record = BusinessRecord {
        id: Uuid::new_v4().to_string(),
        siren: format!("{}-{}", PLACEHOLDER_PREFIX, &suffix[..9]),
        siret: format!("{}-{}", PLACEHOLDER_PREFIX, &suffix[..14]),
        name,
        address,
        postal_code,
        city,
        department,
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
    };
    db::insert_record(pool, &record).await?;
    info!("Created manual record {} ({})", record.id, record.siren);
    println!("Created record {} with placeholder SIREN {}", record.id, record.siren);
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).collect::<String>() + "…"
    }
}
