//! cybertutor-providers: proficiency classifier backends.
//!
//! Implements the `ProficiencyClassifier` trait over the Anthropic and
//! OpenAI-compatible chat APIs, and loads the `cybertutor.toml` configuration
//! that selects between them.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod openai;

pub use config::{
    create_classifier, load_config, load_config_from, CyberTutorConfig, ProviderConfig,
};
pub use error::ProviderError;
pub use mock::{MockClassifier, OfflineClassifier};
