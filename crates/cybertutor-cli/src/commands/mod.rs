//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use cybertutor_core::admin::ContentAdmin;
use cybertutor_core::traits::{DocumentStore, StaticIdentity};
use cybertutor_core::ProgressionEngine;
use cybertutor_providers::{create_classifier, load_config_from, CyberTutorConfig};
use cybertutor_store::FileStore;

pub mod import;
pub mod init;
pub mod next;
pub mod progress;
pub mod quiz;
pub mod register;
pub mod show;
pub mod survey;
pub mod validate;

/// Global flags shared by every store-backed command.
pub struct SessionOptions {
    pub config: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub seed: Option<u64>,
}

/// Loaded config plus the opened data file.
pub struct Session {
    config: CyberTutorConfig,
    store: Arc<FileStore>,
    seed: Option<u64>,
}

impl Session {
    pub async fn open(options: &SessionOptions) -> Result<Self> {
        let config = load_config_from(options.config.as_deref())?;
        let data = options
            .data
            .clone()
            .unwrap_or_else(|| config.data_file.clone());
        let store = FileStore::open(&data)
            .await
            .with_context(|| format!("failed to open data file: {}", data.display()))?;
        tracing::debug!(data = %data.display(), "opened store");

        Ok(Self {
            config,
            store: Arc::new(store),
            seed: options.seed,
        })
    }

    fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn engine(&self) -> Result<ProgressionEngine> {
        let classifier = create_classifier(&self.config)?;
        let engine = ProgressionEngine::new(self.store(), classifier, self.config.engine_config());
        Ok(match self.seed {
            Some(seed) => engine.with_rng(StdRng::seed_from_u64(seed)),
            None => engine,
        })
    }

    pub fn admin(&self, acting_user: &str) -> ContentAdmin {
        ContentAdmin::new(
            self.store(),
            Arc::new(StaticIdentity::signed_in(acting_user)),
        )
    }
}
