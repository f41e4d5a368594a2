// src/lib.rs
//! Prospect ranking and enrichment queue engine.
//!
//! Pulls untreated business records from the store, deduplicates them by
//! SIREN and normalized name, ranks them by the active sort mode, and
//! walks an operator through the resulting work queue. Operator
//! corrections are merged back transactionally on the primary record,
//! with best-effort contact propagation to same-named duplicates.

pub mod commit;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod grouper;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod scoring;
pub mod session;

/// Loads a .env file if present; environment variables already set win.
pub fn load_env() {
    if dotenv::dotenv().is_ok() {
        log::debug!("Loaded environment from .env file");
    }
}
