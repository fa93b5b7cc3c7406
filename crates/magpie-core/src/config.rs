use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Embedding backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name served by Ollama.
    pub model: String,
    /// Base URL of the Ollama server.
    pub url: String,
    /// Expected embedding dimension; `None` lets the first add establish it.
    pub dimension: Option<usize>,
    /// Timeout applied to every embedding call, in seconds.
    pub timeout_secs: u64,
    /// Maximum texts sent in one batched embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_owned(),
            url: "http://localhost:11434".to_owned(),
            dimension: None,
            timeout_secs: 30,
            batch_size: 32,
        }
    }
}

/// Top-level configuration for the knowledge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagpieConfig {
    /// Directory holding the index artifact and stats sidecar.
    pub store_dir: PathBuf,
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap carried between consecutive chunks, in characters.
    pub chunk_overlap: usize,
    /// Embedding backend settings.
    pub embedding: EmbeddingConfig,
}

impl Default for MagpieConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("knowledge_store"),
            chunk_size: 1000,
            chunk_overlap: 200,
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl MagpieConfig {
    /// Get the default config directory path (`~/.magpie`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        use dirs::home_dir;
        let home = home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".magpie"))
    }

    /// Get the default config file path (`~/.magpie/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.magpie/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        use toml::from_str;
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        from_str(&contents)
            .map_err(|error| Error::Config(format!("Failed to parse config: {error}")))
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        use toml::to_string_pretty;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Magpie Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }
}
