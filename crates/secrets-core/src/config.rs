//! Configuration management for k8s-secrets
//!
//! The config file is optional. Missing fields fall back to defaults and a
//! missing file behaves like an empty one.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Global k8s-secrets configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the environment tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envs_dir: Option<PathBuf>,

    /// Print decoded values when listing an environment
    #[serde(default = "default_show_values")]
    pub show_values: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            envs_dir: None,
            show_values: default_show_values(),
        }
    }
}

fn default_show_values() -> bool {
    true
}

impl Config {
    /// Read the config file; a file that does not exist yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        let read = std::fs::read_to_string(path);
        if matches!(&read, Err(e) if e.kind() == ErrorKind::NotFound) {
            return Ok(Self::default());
        }
        let content = read.with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() -> Result<()> {
        let tmp = TempDir::new()?;
        let config = Config::load(&tmp.path().join("nope.json"))?;
        assert!(config.envs_dir.is_none());
        assert!(config.show_values);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"envs_dir": "/srv/envs"}"#)?;

        let config = Config::load(&path)?;
        assert_eq!(config.envs_dir, Some(PathBuf::from("/srv/envs")));
        assert!(config.show_values);
        Ok(())
    }

    #[test]
    fn test_save_and_reload() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("nested").join("config.json");
        let config = Config {
            envs_dir: Some(PathBuf::from("/srv/envs")),
            show_values: false,
        };
        config.save(&path)?;

        let loaded = Config::load(&path)?;
        assert_eq!(loaded.envs_dir, Some(PathBuf::from("/srv/envs")));
        assert!(!loaded.show_values);

        // an unset root is left out of the file
        Config::default().save(&path)?;
        assert!(!std::fs::read_to_string(&path)?.contains("envs_dir"));
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_error() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json")?;
        assert!(Config::load(&path).is_err());
        Ok(())
    }
}
