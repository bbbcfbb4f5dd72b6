//! Covigil — pharmacovigilance data reconciliation and follow-up engine.
//!
//! Matches a reference adverse-drug-reaction dataset against incomplete
//! patient-reported records, generates one follow-up question per missing
//! field (remote generation with a deterministic fallback), persists the
//! per-case workflow, collects answers, and classifies case risk once every
//! question is answered. Transport, file ingestion, and notification layers
//! live outside this crate.

pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod questions;
pub mod reconcile;
pub mod report;
pub mod risk;
pub mod workflow;

use tracing_subscriber::EnvFilter;

/// Initialize tracing with RUST_LOG or the crate default filter.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}
