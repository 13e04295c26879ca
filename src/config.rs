//! Runtime configuration
//!
//! Values come from the process environment, optionally seeded from a `.env` file.

use crate::error::{AdvisorError, Result};
use std::path::PathBuf;

pub const DEFAULT_CATALOG_DIR: &str = "metadata";
pub const DEFAULT_POPULAR_LIMIT: usize = 10;
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Directory holding `join_catalog.db`
    pub catalog_dir: PathBuf,

    /// Postgres connection string used for `information_schema` lookups
    pub database_url: Option<String>,

    /// Default row cap for popular-join queries
    pub popular_limit: usize,

    /// Fallback tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            catalog_dir: PathBuf::from(DEFAULT_CATALOG_DIR),
            database_url: None,
            popular_limit: DEFAULT_POPULAR_LIMIT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AdvisorConfig {
    /// Load `.env` (if present) and read configuration from the environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("JOIN_CATALOG_DIR").filter(|v| !v.trim().is_empty()) {
            config.catalog_dir = PathBuf::from(dir);
        }

        config.database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        if let Some(raw) = lookup("JOIN_POPULAR_LIMIT") {
            config.popular_limit = parse_limit(&raw)?;
        }

        if let Some(filter) = lookup("JOIN_ADVISOR_LOG").filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter;
        }

        Ok(config)
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            AdvisorError::Config("DATABASE_URL is not set".to_string())
        })
    }
}

fn parse_limit(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit),
        _ => Err(AdvisorError::Config(format!(
            "JOIN_POPULAR_LIMIT must be a positive integer, got '{}'",
            raw
        ))),
    }
}
