/*!
Configuration management for the xsig tool.
*/

use crate::wire::WireFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Load configuration if the file exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            debug!("No config file at {}, using defaults", path.as_ref().display());
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Token encoding and decoding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Drop superseded updates before encoding
    pub coalesce: bool,

    /// Offset added to every index before encoding
    pub index_offset: i32,

    /// Largest incomplete token tail kept while reading raw input
    pub stream_buffer_limit: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            coalesce: false,
            index_offset: 0,
            stream_buffer_limit: xsig::stream::DEFAULT_BUFFER_LIMIT,
        }
    }
}

/// Output presentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Wire representation on stdin/stdout
    pub format: WireFormat,

    /// Print decoded tokens as JSON
    pub json: bool,

    /// Use upper-case hex digits
    pub uppercase_hex: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: WireFormat::Hex,
            json: false,
            uppercase_hex: false,
        }
    }
}
