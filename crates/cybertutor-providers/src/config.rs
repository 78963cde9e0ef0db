//! Configuration file loading and classifier factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cybertutor_core::classify::{DEFAULT_SURVEY_TOPICS, SURVEY_TOPIC_COUNT};
use cybertutor_core::scoring::DEFAULT_SAMPLE_SIZE;
use cybertutor_core::traits::ProficiencyClassifier;
use cybertutor_core::EngineConfig;

use crate::anthropic::AnthropicClassifier;
use crate::mock::OfflineClassifier;
use crate::openai::OpenAiClassifier;

/// Configuration for a single classifier backend.
///
/// `Debug` masks API keys.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Key into `[providers]`; empty means offline.
    pub provider: String,
    /// Model override; each backend has its own default.
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Survey topic titles, in the order labels are requested.
    pub topics: [String; SURVEY_TOPIC_COUNT],
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: None,
            timeout_secs: 30,
            max_retries: 1,
            retry_delay_ms: 500,
            topics: DEFAULT_SURVEY_TOPICS.map(String::from),
        }
    }
}

/// `[assessment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentSettings {
    /// Questions drawn per quiz.
    pub sample_size: usize,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

/// Top-level cybertutor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyberTutorConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub assessment: AssessmentSettings,
    /// JSON document store used by the command-line front end.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

fn default_data_file() -> PathBuf {
    PathBuf::from("cybertutor-data.json")
}

impl Default for CyberTutorConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            classifier: ClassifierSettings::default(),
            assessment: AssessmentSettings::default(),
            data_file: default_data_file(),
        }
    }
}

impl CyberTutorConfig {
    /// Engine settings derived from the `[classifier]` and `[assessment]` sections.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sample_size: self.assessment.sample_size,
            classifier_timeout: Duration::from_secs(self.classifier.timeout_secs),
            classifier_max_retries: self.classifier.max_retries,
            classifier_retry_delay: Duration::from_millis(self.classifier.retry_delay_ms),
            survey_topics: self.classifier.topics.clone(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `cybertutor.toml` in the current directory
/// 2. `~/.config/cybertutor/config.toml`
///
/// Environment variable overrides: `CYBERTUTOR_ANTHROPIC_KEY`, `CYBERTUTOR_OPENAI_KEY`.
pub fn load_config() -> Result<CyberTutorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CyberTutorConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("cybertutor.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<CyberTutorConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CyberTutorConfig::default(),
    };

    apply_env_overrides(&mut config);

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn apply_env_overrides(config: &mut CyberTutorConfig) {
    if let Ok(key) = std::env::var("CYBERTUTOR_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("CYBERTUTOR_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("cybertutor"))
}

/// Build the classifier named by `[classifier].provider`.
///
/// Falls back to [`OfflineClassifier`] when the provider is unset, missing
/// from `[providers]`, or has an empty API key.
pub fn create_classifier(config: &CyberTutorConfig) -> Result<Arc<dyn ProficiencyClassifier>> {
    let name = config.classifier.provider.as_str();
    let model = config.classifier.model.clone();

    let Some(provider) = config.providers.get(name).filter(|_| !name.is_empty()) else {
        tracing::warn!(provider = name, "classifier provider not configured, running offline");
        return Ok(Arc::new(OfflineClassifier));
    };

    let classifier: Arc<dyn ProficiencyClassifier> = match provider {
        ProviderConfig::Anthropic { api_key, .. } | ProviderConfig::OpenAI { api_key, .. }
            if api_key.is_empty() =>
        {
            tracing::warn!(provider = name, "empty API key, running offline");
            Arc::new(OfflineClassifier)
        }
        ProviderConfig::Anthropic { api_key, base_url } => Arc::new(
            AnthropicClassifier::new(api_key, model, base_url.clone())
                .context("failed to build Anthropic client")?,
        ),
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(
            OpenAiClassifier::new(api_key, model, base_url.clone(), org_id.clone())
                .context("failed to build OpenAI client")?,
        ),
    };
    Ok(classifier)
}
