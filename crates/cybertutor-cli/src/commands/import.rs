//! The `cybertutor import` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use cybertutor_core::catalog::{load_catalog, validate_catalog};

use super::{Session, SessionOptions};

pub async fn execute(options: &SessionOptions, catalog_path: PathBuf, as_user: String) -> Result<()> {
    let catalog = load_catalog(&catalog_path)?;
    for w in validate_catalog(&catalog) {
        eprintln!(
            "Warning: [{}] {}",
            w.location.as_deref().unwrap_or("catalog"),
            w.message
        );
    }

    let session = Session::open(options).await?;
    let summary = session
        .admin(&as_user)
        .import_catalog(&catalog)
        .await
        .with_context(|| format!("import of {} failed", catalog_path.display()))?;

    println!(
        "Imported {} topics, {} chapters, {} questions",
        summary.topics, summary.chapters, summary.questions
    );
    Ok(())
}
