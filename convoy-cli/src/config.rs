//! Optional `convoy.toml` defaults. CLI flags always win over a config
//! value; a config value always wins over the built-in default.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const CONFIG_ENV_VAR: &str = "CONVOY_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "convoy.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub store_dir: Option<PathBuf>,
    pub client_state: Option<PathBuf>,
    pub flake_uri: Option<String>,
    pub hostname: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Resolves the config file path via `CONVOY_CONFIG`, falling back to
/// `./convoy.toml` if present. Returns an empty `FileConfig` - not an error -
/// when neither is present, since the file is entirely optional.
pub fn load() -> Result<FileConfig, ConfigError> {
    let path = match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };
    load_from(&path)
}

fn load_from(path: &Path) -> Result<FileConfig, ConfigError> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// CLI flag, then config value, then a built-in default.
pub fn resolve<T>(flag: Option<T>, config: Option<T>, default: T) -> T {
    flag.or(config).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    #[rstest]
    fn missing_file_yields_empty_config() {
        let config = load_from(Path::new("/nonexistent/convoy.toml")).unwrap();
        assert!(config.store_dir.is_none());
    }

    #[rstest]
    fn parses_declared_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("convoy.toml");
        std::fs::write(&path, "hostname = \"testvm\"\nflake_uri = \"github:acme/flake\"\n").unwrap();
        let config = load_from(&path).unwrap();
        assert_eq!(config.hostname.as_deref(), Some("testvm"));
        assert_eq!(config.flake_uri.as_deref(), Some("github:acme/flake"));
    }

    #[rstest]
    fn unknown_field_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("convoy.toml");
        std::fs::write(&path, "bogus = 1\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[rstest]
    fn resolve_prefers_flag_then_config_then_default() {
        assert_eq!(resolve(Some("flag"), Some("config"), "default"), "flag");
        assert_eq!(resolve(None, Some("config"), "default"), "config");
        assert_eq!(resolve(None::<&str>, None, "default"), "default");
    }
}
