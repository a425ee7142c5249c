//! feed-enricher CLI — annotate saved pages, watch live captures, inspect the payload cache.

pub mod commands;
pub mod config;

pub use commands::{load_document, render_report};
pub use config::{load_enricher_config, resolve_cache_dir};
