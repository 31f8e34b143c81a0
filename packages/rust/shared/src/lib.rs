//! Shared types, error model, and configuration for citegraph.
//!
//! This crate is the foundation depended on by all other citegraph crates.
//! It provides:
//! - [`CitegraphError`]: the unified error type
//! - Domain types ([`Node`], [`Parents`], [`Link`], [`Artifact`])
//! - Configuration ([`AppConfig`], [`SyncConfig`], [`CitationConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CONFIG_FILE_NAME, CitationConfig, CitationsSection, PathsSection, RefreshPolicy,
    SyncConfig, WritePolicy, init_config, load_config, load_config_from,
};
pub use error::{CitegraphError, Result};
pub use types::{Artifact, Link, Node, Parents};
