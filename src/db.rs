// src/db.rs
use anyhow::{bail, Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::{debug, info};
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config, NoTls, Row};

use crate::commit::RecordPatch;
use crate::models::{BusinessRecord, EnrichmentStatus};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

const PROSPECT_TABLE: &str = "public.prospect";

const RECORD_COLUMNS: &str = "id, siren, siret, name, address, postal_code, city, department, \
     naf, headcount_bracket, legal_form_code, latitude, longitude, quality_score, \
     phone, email, website, enrichment_status, enrichment_attempts, last_attempt_at, \
     created_at, updated_at";

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("POSTGRES_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "prospection".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("prospection_engine");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);
    let pool = Pool::builder()
        .max_size(10)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;
    Ok(pool)
}

fn record_from_row(row: &Row) -> Result<BusinessRecord> {
    let status: Option<String> = row.try_get("enrichment_status")?;
    Ok(BusinessRecord {
        id: row.try_get("id")?,
        siren: row.try_get("siren")?,
        siret: row.try_get("siret")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        postal_code: row.try_get("postal_code")?,
        city: row.try_get("city")?,
        department: row.try_get("department")?,
        naf: row.try_get("naf")?,
        headcount_bracket: row.try_get("headcount_bracket")?,
        legal_form_code: row.try_get("legal_form_code")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        quality_score: row.try_get("quality_score")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        website: row.try_get("website")?,
        enrichment_status: status.as_deref().and_then(EnrichmentStatus::from_str_opt),
        enrichment_attempts: row.try_get("enrichment_attempts")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Untreated means: no phone on file and an enrichment status the queue
/// still surfaces (`NULL`, `pending` or `enriching`; never `done` or
/// `failed`).
const UNTREATED_WHERE: &str = "(phone IS NULL OR phone = '') \
     AND (enrichment_status IS NULL OR enrichment_status IN ('pending', 'enriching'))";

fn untreated_filter_sql(has_departments: bool, has_codes: bool) -> String {
    let mut where_sql = UNTREATED_WHERE.to_string();
    let mut n = 0;
    if has_departments {
        n += 1;
        where_sql.push_str(&format!(" AND department = ANY(${})", n));
    }
    if has_codes {
        n += 1;
        where_sql.push_str(&format!(" AND headcount_bracket = ANY(${})", n));
    }
    where_sql
}

/// Fetches a batch of untreated records, optionally restricted to a
/// department set and a headcount bracket code set.
pub async fn fetch_untreated(
    pool: &PgPool,
    departments: Option<&[String]>,
    headcount_codes: Option<&[&str]>,
    limit: i64,
) -> Result<Vec<BusinessRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_untreated")?;

    let deps: Option<Vec<String>> = departments.map(|d| d.to_vec());
    let codes: Option<Vec<String>> =
        headcount_codes.map(|cs| cs.iter().map(|c| c.to_string()).collect());

    let mut where_sql = untreated_filter_sql(deps.is_some(), codes.is_some());
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(deps) = &deps {
        params.push(deps);
    }
    if let Some(codes) = &codes {
        params.push(codes);
    }
    params.push(&limit);
    where_sql.push_str(&format!(" ORDER BY id LIMIT ${}", params.len()));

    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        RECORD_COLUMNS, PROSPECT_TABLE, where_sql
    );
    debug!("fetch_untreated: {}", sql);

    let rows = conn
        .query(&sql, &params)
        .await
        .context("Failed to query untreated records")?;
    rows.iter().map(record_from_row).collect()
}

/// Count-only variant of [`fetch_untreated`]: same filters, no cap. Feeds
/// the remaining-candidates progress display.
pub async fn count_untreated(
    pool: &PgPool,
    departments: Option<&[String]>,
    headcount_codes: Option<&[&str]>,
) -> Result<i64> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for count_untreated")?;

    let deps: Option<Vec<String>> = departments.map(|d| d.to_vec());
    let codes: Option<Vec<String>> =
        headcount_codes.map(|cs| cs.iter().map(|c| c.to_string()).collect());

    let where_sql = untreated_filter_sql(deps.is_some(), codes.is_some());
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    if let Some(deps) = &deps {
        params.push(deps);
    }
    if let Some(codes) = &codes {
        params.push(codes);
    }

    let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", PROSPECT_TABLE, where_sql);
    let row = conn
        .query_one(&sql, &params)
        .await
        .context("Failed to count untreated records")?;
    Ok(row.get::<_, i64>(0))
}

pub async fn fetch_record(pool: &PgPool, id: &str) -> Result<Option<BusinessRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_record")?;
    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1",
        RECORD_COLUMNS, PROSPECT_TABLE
    );
    let row = conn
        .query_opt(&sql, &[&id])
        .await
        .context("Failed to query record by id")?;
    row.as_ref().map(record_from_row).transpose()
}

/// Substring name search backing the queue's search escape hatch.
pub async fn search_by_name(pool: &PgPool, term: &str, limit: i64) -> Result<Vec<BusinessRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for search_by_name")?;
    let pattern = format!("%{}%", term);
    let sql = format!(
        "SELECT {} FROM {} WHERE name ILIKE $1 ORDER BY name LIMIT $2",
        RECORD_COLUMNS, PROSPECT_TABLE
    );
    let rows = conn
        .query(&sql, &[&pattern, &limit])
        .await
        .context("Failed to search records by name")?;
    rows.iter().map(record_from_row).collect()
}

/// Records whose name matches exactly (case-insensitively), excluding the
/// record itself. This is the duplicate-propagation key, deliberately
/// stricter than the normalized-name key the dedup step uses.
pub async fn fetch_duplicates_by_name(
    pool: &PgPool,
    name: &str,
    exclude_id: &str,
) -> Result<Vec<BusinessRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_duplicates_by_name")?;
    let sql = format!(
        "SELECT {} FROM {} WHERE LOWER(name) = LOWER($1) AND id <> $2",
        RECORD_COLUMNS, PROSPECT_TABLE
    );
    let rows = conn
        .query(&sql, &[&name, &exclude_id])
        .await
        .context("Failed to query duplicates by name")?;
    rows.iter().map(record_from_row).collect()
}

/// All establishments sharing a SIREN, for the multi-establishment
/// grouper.
pub async fn fetch_group(pool: &PgPool, siren: &str) -> Result<Vec<BusinessRecord>> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for fetch_group")?;
    let sql = format!(
        "SELECT {} FROM {} WHERE siren = $1 ORDER BY siret",
        RECORD_COLUMNS, PROSPECT_TABLE
    );
    let rows = conn
        .query(&sql, &[&siren])
        .await
        .context("Failed to query establishment group")?;
    rows.iter().map(record_from_row).collect()
}

/// Applies a patch to one record. Only columns present in the patch are
/// written; `updated_at` is always bumped. Errors if the record does not
/// exist.
pub async fn update_record(pool: &PgPool, id: &str, patch: &RecordPatch) -> Result<()> {
    if patch.is_empty() {
        return Ok(());
    }
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for update_record")?;

    let status = patch.enrichment_status.map(|s| s.as_str().to_string());
    let mut sets: Vec<String> = Vec::new();
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

    let text_columns: [(&str, &Option<String>); 11] = [
        ("phone", &patch.phone),
        ("email", &patch.email),
        ("website", &patch.website),
        ("name", &patch.name),
        ("city", &patch.city),
        ("postal_code", &patch.postal_code),
        ("department", &patch.department),
        ("address", &patch.address),
        ("siren", &patch.siren),
        ("siret", &patch.siret),
        ("enrichment_status", &status),
    ];
    for (column, value) in text_columns {
        if let Some(v) = value {
            params.push(v);
            sets.push(format!("{} = ${}", column, params.len()));
        }
    }
    if let Some(v) = &patch.enrichment_attempts {
        params.push(v);
        sets.push(format!("enrichment_attempts = ${}", params.len()));
    }
    if let Some(v) = &patch.last_attempt_at {
        params.push(v);
        sets.push(format!("last_attempt_at = ${}", params.len()));
    }
    sets.push("updated_at = CURRENT_TIMESTAMP".to_string());

    params.push(&id);
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ${}",
        PROSPECT_TABLE,
        sets.join(", "),
        params.len()
    );
    debug!("update_record {}: {}", id, sql);

    let updated = conn
        .execute(&sql, &params)
        .await
        .context(format!("Failed to update record {}", id))?;
    if updated == 0 {
        bail!("Record {} not found in store", id);
    }
    Ok(())
}

/// Inserts a manually-created record. Callers supply the placeholder
/// identifiers; bulk import has its own path outside this engine.
pub async fn insert_record(pool: &PgPool, record: &BusinessRecord) -> Result<()> {
    let conn = pool
        .get()
        .await
        .context("Failed to get DB connection for insert_record")?;
    let status = record.enrichment_status.map(|s| s.as_str().to_string());
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
         $14, $15, $16, $17, $18, $19, $20, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        PROSPECT_TABLE, RECORD_COLUMNS
    );
    conn.execute(
        &sql,
        &[
            &record.id,
            &record.siren,
            &record.siret,
            &record.name,
            &record.address,
            &record.postal_code,
            &record.city,
            &record.department,
            &record.naf,
            &record.headcount_bracket,
            &record.legal_form_code,
            &record.latitude,
            &record.longitude,
            &record.quality_score,
            &record.phone,
            &record.email,
            &record.website,
            &status,
            &record.enrichment_attempts,
            &record.last_attempt_at,
        ],
    )
    .await
    .context(format!("Failed to insert record {}", record.id))?;
    Ok(())
}
