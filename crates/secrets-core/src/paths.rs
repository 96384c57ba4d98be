//! Standard paths used by k8s-secrets

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Environment variable that overrides the storage root
pub const ENV_DIR_VAR: &str = "K8S_SECRETS_DIR";

/// Standard k8s-secrets paths
pub struct Paths {
    /// Data directory (~/.local/share/k8s-secrets)
    pub data: PathBuf,
    /// Config directory (~/.config/k8s-secrets)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("k8s-secrets");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("k8s-secrets");

        Self { data, config }
    }

    /// Build paths rooted somewhere other than the user's home
    pub fn with_base(base: &Path) -> Self {
        Self {
            data: base.join("data"),
            config: base.join("config"),
        }
    }

    /// Default directory holding one table per environment
    pub fn envs_dir(&self) -> PathBuf {
        self.data.join("envs")
    }

    /// Default config file location
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }
}

/// Where a storage root came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSource {
    Flag,
    Environment,
    ConfigFile,
    Default,
}

impl fmt::Display for RootSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RootSource::Flag => "--dir",
            RootSource::Environment => ENV_DIR_VAR,
            RootSource::ConfigFile => "config file",
            RootSource::Default => "default",
        };
        f.write_str(s)
    }
}

/// The directory the environment store is rooted at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    pub path: PathBuf,
    pub source: RootSource,
}

impl StorageRoot {
    /// Resolve the root from the flag, the process environment, the config
    /// file and finally the default data directory, in that order.
    pub fn resolve(flag: Option<PathBuf>, config: &Config, paths: &Paths) -> Self {
        let from_env = std::env::var_os(ENV_DIR_VAR).map(PathBuf::from);
        Self::resolve_with(flag, from_env, config, paths)
    }

    /// Same as [`StorageRoot::resolve`] with the environment value supplied
    pub fn resolve_with(
        flag: Option<PathBuf>,
        from_env: Option<PathBuf>,
        config: &Config,
        paths: &Paths,
    ) -> Self {
        let non_empty = |p: &PathBuf| !p.as_os_str().is_empty();

        if let Some(path) = flag.filter(non_empty) {
            return Self {
                path,
                source: RootSource::Flag,
            };
        }
        if let Some(path) = from_env.filter(non_empty) {
            return Self {
                path,
                source: RootSource::Environment,
            };
        }
        if let Some(path) = config.envs_dir.clone().filter(non_empty) {
            return Self {
                path,
                source: RootSource::ConfigFile,
            };
        }
        Self {
            path: paths.envs_dir(),
            source: RootSource::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins() {
        let paths = Paths::with_base(Path::new("/base"));
        let config = Config {
            envs_dir: Some(PathBuf::from("/from-config")),
            ..Config::default()
        };
        let root = StorageRoot::resolve_with(
            Some(PathBuf::from("/from-flag")),
            Some(PathBuf::from("/from-env")),
            &config,
            &paths,
        );
        assert_eq!(root.path, PathBuf::from("/from-flag"));
        assert_eq!(root.source, RootSource::Flag);
    }

    #[test]
    fn test_env_then_config() {
        let paths = Paths::with_base(Path::new("/base"));
        let config = Config {
            envs_dir: Some(PathBuf::from("/from-config")),
            ..Config::default()
        };

        let from_env = Some(PathBuf::from("/from-env"));
        let root = StorageRoot::resolve_with(None, from_env, &config, &paths);
        assert_eq!(root.source, RootSource::Environment);

        let root = StorageRoot::resolve_with(None, Some(PathBuf::new()), &config, &paths);
        assert_eq!(root.path, PathBuf::from("/from-config"));
        assert_eq!(root.source, RootSource::ConfigFile);
    }

    #[test]
    fn test_default_root() {
        let paths = Paths::with_base(Path::new("/base"));
        let root = StorageRoot::resolve_with(None, None, &Config::default(), &paths);
        assert_eq!(root.path, PathBuf::from("/base/data/envs"));
        assert_eq!(root.source, RootSource::Default);
    }
}
