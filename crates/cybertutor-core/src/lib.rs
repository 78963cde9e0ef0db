//! cybertutor-core: progression engine, data model, and content rules.
//!
//! This crate defines the typed records, the collaborator traits (document
//! store, identity, proficiency classifier), and the rules that decide how a
//! learner progresses through topics and chapters.

pub mod admin;
pub mod catalog;
pub mod classify;
pub mod engine;
pub mod error;
pub mod model;
pub mod presentation;
pub mod records;
pub mod scoring;
pub mod traits;

pub use engine::{EngineConfig, ProgressionEngine};
pub use error::{EngineError, StoreError};
