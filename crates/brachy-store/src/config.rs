//! TOML loading for [`ScoringConfig`].

use std::fs;
use std::path::Path;

use brachy_core::ScoringConfig;

use crate::error::{Result, StoreError};

/// Parse and validate a config file. Missing keys take their defaults.
pub fn load_config(path: &Path) -> Result<ScoringConfig> {
    let text = fs::read_to_string(path).map_err(|e| {
        StoreError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_config(&text)
}

pub fn parse_config(text: &str) -> Result<ScoringConfig> {
    let config: ScoringConfig = toml::from_str(text)?;
    config.validate()?;
    tracing::debug!(volume = %config.scoring_volume, "loaded scoring config");
    Ok(config)
}

/// The default configuration rendered as TOML.
pub fn default_config_toml() -> Result<String> {
    Ok(toml::to_string_pretty(&ScoringConfig::default())?)
}
