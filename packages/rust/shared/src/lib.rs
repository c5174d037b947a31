//! Shared types, error model, and configuration for Presswork.
//!
//! This crate is the foundation depended on by all other Presswork crates.
//! It provides:
//! - [`PressworkError`] and [`GatewayError`], the unified error types
//! - Domain types ([`WorkItem`], [`Status`], [`ContentRecord`], [`ResearchRecord`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FreshnessConfig, GatewayConfig, GatewayMode, HttpGatewayConfig, PathsConfig,
    SearchConfig, SelectorConfig, StageConfig, StagesConfig, SubprocessConfig, ValidationConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, read_api_key,
};
pub use error::{GatewayError, PressworkError, Result};
pub use types::{
    ContentKind, ContentRecord, ContentStatus, FreshnessSignal, ItemRef, Keyword, Language,
    NewFreshnessSignal, NewKeyword, NewNewsItem, NewPaaQuestion, NewWorkItem, NewsItem,
    PaaQuestion, ResearchRecord, Status, WorkItem, WorkItemKind,
};
