//! Rendering of run summaries and catalog plans.

use serde_json::json;
use stindex_core::{Catalog, RunSummary};

pub fn print_run_summary(summary: &RunSummary) {
    println!("Partitions discovered: {}", summary.discovered);
    println!("Already indexed: {}", summary.already_indexed);
    println!("Newly built: {}", summary.report.succeeded.len());
    println!("Failed: {}", summary.report.failed.len());
    for failure in &summary.report.failed {
        println!("  {}: {}", failure.key, failure.cause);
    }
    if !summary.stale_indexes.is_empty() {
        println!("Stale indexes (no slice): {}", summary.stale_indexes.join(", "));
    }
}

pub fn run_summary_json(summary: &RunSummary) -> serde_json::Value {
    json!({
        "discovered": summary.discovered,
        "already_indexed": summary.already_indexed,
        "newly_built": summary.report.succeeded,
        "failed": summary
            .report
            .failed
            .iter()
            .map(|f| json!({ "key": f.key, "cause": f.cause.to_string() }))
            .collect::<Vec<_>>(),
        "stale_indexes": summary.stale_indexes,
    })
}

pub fn print_plan(catalog: &Catalog) {
    println!("Partitions discovered: {}", catalog.discovered());
    println!("Already indexed: {}", catalog.already_indexed());
    let missing = catalog.build_set();
    println!("Missing indexes: {}", missing.len());
    for key in &missing {
        println!("  {key}");
    }
    let stale = catalog.stale_indexes();
    if !stale.is_empty() {
        println!("Stale indexes (no slice): {}", stale.join(", "));
    }
}

pub fn plan_json(catalog: &Catalog) -> serde_json::Value {
    json!({
        "discovered": catalog.discovered(),
        "already_indexed": catalog.already_indexed(),
        "missing": catalog.build_set(),
        "stale_indexes": catalog.stale_indexes(),
    })
}
