//! Configuration Module - User preferences from config.toml
//!
//! Supports:
//! - Log level
//! - I/O buffer size
//! - Extraction manifest default
//! - Names given to files found by the JPEG scan

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::image::DEFAULT_BUFFER_BLOCKS;
use crate::scan::ScanOptions;

/// Rescue Drill Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Image I/O settings
    pub io: IoConfig,
    /// Extraction settings
    pub extract: ExtractConfig,
    /// JPEG scan settings
    pub scan: ScanConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Image I/O settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Size of each read buffer, in 2048-byte blocks
    pub buffer_blocks: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            buffer_blocks: DEFAULT_BUFFER_BLOCKS,
        }
    }
}

/// Extraction settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Write a blake3 manifest into the output directory
    pub manifest: bool,
}

/// JPEG scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Prefix of generated names (File1.jpg, File2.jpg, ...)
    pub name_prefix: String,
    /// Extension of generated names
    pub extension: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let options = ScanOptions::default();
        Self {
            name_prefix: options.name_prefix,
            extension: options.extension,
        }
    }
}

impl ScanConfig {
    pub fn to_options(&self) -> ScanOptions {
        ScanOptions {
            name_prefix: self.name_prefix.clone(),
            extension: self.extension.clone(),
        }
    }
}

impl Config {
    /// Load config from default path or return defaults
    pub fn load() -> Self {
        Self::load_from(&Self::default_path()).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "tunclon", "rescue-drill")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".rescue-drill")
                    .join("config.toml")
            })
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    r#"# Rescue Drill Configuration
# Location: ~/.config/rescue-drill/config.toml (or %APPDATA%\rescue-drill\config.toml on Windows)

[general]
# Log level: trace, debug, info, warn, error
log_level = "info"

[io]
# Read buffer size in 2048-byte blocks (two buffers are allocated)
buffer_blocks = 1024

[extract]
# Write rescue-drill-manifest.json with blake3 hashes of extracted files
manifest = false

[scan]
# Files found by --jpg are named <name_prefix><N>.<extension>
name_prefix = "File"
extension = "jpg"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.io.buffer_blocks, 1024);
        assert!(!config.extract.manifest);
        assert_eq!(config.scan.name_prefix, "File");
        assert_eq!(config.scan.extension, "jpg");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("test_config.toml");

        let mut config = Config::default();
        config.io.buffer_blocks = 16;
        config.scan.name_prefix = "Photo".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.io.buffer_blocks, 16);
        assert_eq!(loaded.scan.to_options().name_prefix, "Photo");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[extract]\nmanifest = true\n").unwrap();
        assert!(config.extract.manifest);
        assert_eq!(config.io.buffer_blocks, 1024);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_parse_sample_config() {
        let sample = generate_sample_config();
        let config: Config = toml::from_str(&sample).unwrap();
        assert_eq!(config.io.buffer_blocks, DEFAULT_BUFFER_BLOCKS);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_from(&dir.path().join("absent.toml")).is_err());
    }
}
