//! Shared types, error model, and configuration for citeflow.
//!
//! This crate is the foundation depended on by all other citeflow crates.
//! It provides:
//! - [`CiteflowError`], the unified error type
//! - Domain types ([`SourceRecord`], [`CitationMarker`], [`AnswerDocument`], [`TurnId`])
//! - Configuration ([`AppConfig`], [`StreamConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CitationsConfig, RenderConfig, StreamConfig, api_token, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{CiteflowError, Result};
pub use types::{AnswerDocument, CitationMarker, LinkTarget, SourceRecord, TurnId};
