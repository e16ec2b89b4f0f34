//! Runtime configuration for the sync engine.
//!
//! Values are read from the environment with sensible defaults; invalid
//! values are logged and replaced by the default rather than aborting.

use std::env;

use tracing::warn;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum items per outbound batch (`SYNC_BATCH_SIZE`).
    pub batch_size: usize,
    /// Base URL for server endpoints (`API_BASE_URL`).
    pub api_base_url: String,
    /// Attempts before an intent is dead-lettered (`MAX_RETRIES`).
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl SyncConfig {
    /// Build a configuration from recognized environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = env::var("SYNC_BATCH_SIZE") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.batch_size = n,
                _ => warn!(value = %raw, "ignoring invalid SYNC_BATCH_SIZE"),
            }
        }

        if let Ok(raw) = env::var("API_BASE_URL") {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                warn!("ignoring empty API_BASE_URL");
            } else {
                config.api_base_url = trimmed.trim_end_matches('/').to_string();
            }
        }

        if let Ok(raw) = env::var("MAX_RETRIES") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.max_retries = n,
                _ => warn!(value = %raw, "ignoring invalid MAX_RETRIES"),
            }
        }

        config
    }
}
