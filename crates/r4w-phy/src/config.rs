//! # Configuration
//!
//! YAML configuration for the PHY kernels:
//!
//! - LLR fixed-point policy (post-SINR format, LLR format, output range)
//! - Cholesky inverse options (refinement steps, pivot checking)
//! - Logging
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `R4W_PHY_CONFIG` environment variable
//! 2. `./r4w-phy.yaml` (current directory)
//! 3. `~/.config/r4w-phy/phy.yaml` (user config)
//! 4. `/etc/r4w/phy.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! llr:
//!   post_sinr_frac_bits: 10
//!   llr_frac_bits: 2
//!   range_low: -127
//!   range_high: 127
//!
//! cholesky:
//!   refinement_steps: 0
//!   check_pivots: false
//!
//! logging:
//!   level: "info"
//!   format: "json"
//! ```

use crate::cholesky::CholeskyOptions;
use crate::observe::LogConfig;
use crate::soft_demapper::LlrScaling;
use crate::types::PhyResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "R4W_PHY_CONFIG";

/// Error type for configuration operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    ReadError(String),

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// LLR output policy as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlrConfig {
    /// Fractional bits of the `1/(1-beta)` input (0-15)
    pub post_sinr_frac_bits: u8,
    /// Fractional bits of the 8-bit LLR output (0-7)
    pub llr_frac_bits: u8,
    pub range_low: i16,
    pub range_high: i16,
}

impl Default for LlrConfig {
    fn default() -> Self {
        let scaling = LlrScaling::default();
        Self {
            post_sinr_frac_bits: scaling.post_sinr_frac_bits(),
            llr_frac_bits: scaling.llr_frac_bits(),
            range_low: scaling.range_low(),
            range_high: scaling.range_high(),
        }
    }
}

impl LlrConfig {
    pub fn scaling(&self) -> PhyResult<LlrScaling> {
        LlrScaling::new(
            self.post_sinr_frac_bits,
            self.llr_frac_bits,
            self.range_low,
            self.range_high,
        )
    }
}

/// Complete PHY kernel configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhyConfig {
    pub llr: LlrConfig,
    pub cholesky: CholeskyOptions,
    pub logging: LogConfig,
}

impl PhyConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns the defaults if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
            tracing::warn!(path = %path, "{} points to a missing file", CONFIG_ENV_VAR);
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        tracing::debug!("no PHY config file found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config = Self::parse(&content)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded PHY config");
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Configuration search paths after the environment variable.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./r4w-phy.yaml")];

        if let Some(dirs) = directories::ProjectDirs::from("", "", "r4w-phy") {
            paths.push(dirs.config_dir().join("phy.yaml"));
        }

        paths.push(PathBuf::from("/etc/r4w/phy.yaml"));
        paths
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.llr
            .scaling()
            .map_err(|e| ConfigError::ValidationError(format!("llr: {}", e)))?;

        if self.cholesky.refinement_steps > 4 {
            return Err(ConfigError::ValidationError(format!(
                "cholesky.refinement_steps must be 0-4, got {}",
                self.cholesky.refinement_steps
            )));
        }

        Ok(())
    }

    /// Validated LLR scaling.
    pub fn llr_scaling(&self) -> Result<LlrScaling, ConfigError> {
        self.llr
            .scaling()
            .map_err(|e| ConfigError::ValidationError(format!("llr: {}", e)))
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{LogFormat, LogLevel};

    #[test]
    fn test_default_config() {
        let config = PhyConfig::default();
        assert_eq!(config.llr.post_sinr_frac_bits, 10);
        assert_eq!(config.llr.llr_frac_bits, 2);
        assert_eq!(config.llr_scaling().unwrap(), LlrScaling::default());
        assert!(!config.cholesky.check_pivots);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
llr:
  post_sinr_frac_bits: 12
  llr_frac_bits: 3
  range_low: -100
  range_high: 63
cholesky:
  refinement_steps: 1
  check_pivots: true
logging:
  level: debug
  format: json
"#;
        let config = PhyConfig::parse(yaml).unwrap();
        assert_eq!(config.llr.post_sinr_frac_bits, 12);
        assert_eq!(config.llr.range_high, 63);
        assert_eq!(config.cholesky.refinement_steps, 1);
        assert!(config.cholesky.check_pivots);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);

        let scaling = config.llr_scaling().unwrap();
        assert_eq!(scaling.range_low(), -100);
    }

    #[test]
    fn test_parse_partial_yaml() {
        let config = PhyConfig::parse("llr:\n  llr_frac_bits: 4\n").unwrap();
        assert_eq!(config.llr.llr_frac_bits, 4);
        // Unspecified fields keep their defaults
        assert_eq!(config.llr.range_low, -127);
        assert_eq!(config.cholesky, CholeskyOptions::default());
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_parse_error() {
        let err = PhyConfig::parse("llr: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
        let err = PhyConfig::parse("llr:\n  range_low: -40000\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = PhyConfig::default();
        config.llr.range_low = 10;
        config.llr.range_high = -10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().starts_with("invalid config: llr:"), "{}", err);

        let mut config = PhyConfig::default();
        config.llr.llr_frac_bits = 9;
        assert!(config.validate().is_err());

        let mut config = PhyConfig::default();
        config.cholesky.refinement_steps = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_yaml() {
        let yaml = PhyConfig::example_yaml();
        assert!(yaml.contains("post_sinr_frac_bits"));
        assert!(yaml.contains("refinement_steps"));
        let parsed = PhyConfig::parse(&yaml).unwrap();
        assert_eq!(parsed, PhyConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("r4w-phy-config-{}.yaml", std::process::id()));
        let mut config = PhyConfig::default();
        config.llr.range_low = -64;
        config.save(&path).unwrap();
        let loaded = PhyConfig::load_from(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);

        let err = PhyConfig::load_from(Path::new("/nonexistent/r4w-phy.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }

    #[test]
    fn test_config_search_paths() {
        let paths = PhyConfig::config_search_paths();
        assert!(paths.len() >= 2);
        assert_eq!(paths[0], PathBuf::from("./r4w-phy.yaml"));
        assert_eq!(paths.last().unwrap(), &PathBuf::from("/etc/r4w/phy.yaml"));
    }
}
