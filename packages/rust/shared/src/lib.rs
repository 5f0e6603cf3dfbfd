//! Shared types, error model, and configuration for scrapedesk.
//!
//! This crate is the foundation depended on by all other scrapedesk crates.
//! It provides:
//! - [`ScrapeDeskError`] — the unified error type
//! - Domain types ([`CanonicalUrl`], [`UrlSet`], [`ProductDetailRecord`], [`JobPhase`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, DefaultsConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{ScrapeDeskError, Result};
pub use types::{
    CanonicalUrl, FileKind, JobPhase, LogEvent, PhaseKind, ProductDetailBatch, ProductDetailRecord,
    ProductUrlResult, UrlSet,
};
