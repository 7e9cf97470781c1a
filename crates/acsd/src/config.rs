//! Configuration file handling for acsd

use std::path::Path;

use acs_sdk::AcsConfig;
use anyhow::{Context, Result};
use tracing::warn;

/// Load configuration from a TOML file, or defaults when no path is given
pub fn load(path: Option<&Path>) -> Result<AcsConfig> {
    let Some(path) = path else {
        return Ok(AcsConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Log every section that failed validation
///
/// Invalid sections only disable the feature that depends on them.
pub fn report_invalid_sections(config: &AcsConfig) -> usize {
    let errors = config.section_errors();
    for (section, error) in &errors {
        warn!(section = *section, error = %error, "Configuration section invalid");
    }
    errors.len()
}
