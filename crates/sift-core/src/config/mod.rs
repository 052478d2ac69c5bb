mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};
use sift_index::{ChunkerConfig, IndexerConfig, WalkerConfig};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the chunker and indexer cannot work with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        let index = &self.index;
        if index.chunk_size == 0 {
            bail!("index.chunk_size must be greater than 0");
        }
        if index.chunk_overlap >= index.chunk_size {
            bail!(
                "index.chunk_overlap ({}) must be smaller than index.chunk_size ({})",
                index.chunk_overlap,
                index.chunk_size
            );
        }
        if index.batch_size == 0 {
            bail!("index.batch_size must be greater than 0");
        }
        if !(index.split_threshold > 0.0 && index.split_threshold <= 1.0) {
            bail!(
                "index.split_threshold must be in (0, 1], got {}",
                index.split_threshold
            );
        }
        if index.oversize_factor.is_nan() || index.oversize_factor < 1.0 {
            bail!(
                "index.oversize_factor must be at least 1.0, got {}",
                index.oversize_factor
            );
        }
        Ok(())
    }

    /// Render the effective configuration, env overrides included, as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Engine settings derived from the `[index]` section.
    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        let index = &self.index;
        IndexerConfig {
            chunker: ChunkerConfig {
                chunk_size: index.chunk_size,
                overlap: index.chunk_overlap,
                split_threshold: index.split_threshold,
                oversize_factor: index.oversize_factor,
            },
            walker: WalkerConfig {
                extensions: index.supported_extensions.clone(),
                ignore_patterns: index.ignore_patterns.clone(),
                respect_gitignore: index.respect_gitignore,
            },
            batch_size: index.batch_size,
            file_preview_chars: index.file_preview_chars,
        }
    }
}
