//! Configuration file support for axcal.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/axcal/config.toml`.

use crate::compare::Tolerance;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub comparison: ComparisonConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Default tolerances for calibration comparison
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComparisonConfig {
    #[serde(default = "default_rtol")]
    pub rtol: f64,

    #[serde(default = "default_atol")]
    pub atol: f64,

    #[serde(default = "default_equal_nan")]
    pub equal_nan: bool,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            rtol: default_rtol(),
            atol: default_atol(),
            equal_nan: default_equal_nan(),
        }
    }
}

/// Output formatting configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_pretty_json")]
    pub pretty_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty_json: default_pretty_json(),
        }
    }
}

// Default value functions
fn default_rtol() -> f64 {
    Tolerance::default().rtol
}

fn default_atol() -> f64 {
    Tolerance::default().atol
}

fn default_equal_nan() -> bool {
    Tolerance::default().equal_nan
}

fn default_pretty_json() -> bool {
    true
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("axcal").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Tolerances must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("rtol", self.comparison.rtol), ("atol", self.comparison.atol)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "comparison.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Comparison tolerance built from the `[comparison]` section.
    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            rtol: self.comparison.rtol,
            atol: self.comparison.atol,
            equal_nan: self.comparison.equal_nan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tolerance(), Tolerance::default());
        assert!(config.output.pretty_json);
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[comparison]
rtol = 0.01
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.comparison.rtol, 0.01);
        assert_eq!(config.comparison.atol, 1e-4); // default
        assert!(config.output.pretty_json);
    }

    #[test]
    fn test_save_and_load_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.output.pretty_json = false;
        config.comparison.equal_nan = false;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!loaded.tolerance().equal_nan);
    }

    #[test]
    fn test_invalid_tolerance_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[comparison]\natol = -1.0\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));

        std::fs::write(&path, "[comparison\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Toml(_))));
    }
}
