//! The `cybertutor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use cybertutor_core::catalog::{load_catalog, validate_catalog};

pub fn execute(catalog_path: PathBuf) -> Result<()> {
    let catalog = load_catalog(&catalog_path)?;

    println!(
        "Catalog: {} topics, {} chapters, {} questions",
        catalog.topics.len(),
        catalog.chapter_count(),
        catalog.question_count()
    );

    let warnings = validate_catalog(&catalog);
    for w in &warnings {
        let prefix = w
            .location
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Catalog valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
