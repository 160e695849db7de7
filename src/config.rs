//! Configuration file handling shared by the agent and the server.
//!
//! Both binaries merge CLI/environment values over an optional config file
//! over built-in defaults. The file may be YAML, JSON or TOML; the format is
//! picked from the extension and defaults to YAML.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::cli::ConfigFormat;

/// Errors raised while loading or validating configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to render configuration: {0}")]
    Render(String),
}

/// Loads `T` from `path`, or from the first existing entry of `defaults`.
///
/// Returns `T::default()` when no file is found.
pub fn load_file<T>(path: Option<&Path>, defaults: &[&str]) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match defaults.iter().map(Path::new).find(|p| p.exists()) {
            Some(p) => p.to_path_buf(),
            None => return Ok(T::default()),
        },
    };

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let parse_err = |reason: String| ConfigError::Parse {
        path: path.clone(),
        reason,
    };

    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        Some("toml") => toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
        _ => serde_yaml::from_str(&content).map_err(|e| parse_err(e.to_string()))?,
    };
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Renders the effective configuration in the requested format.
pub fn render<T: Serialize>(config: &T, format: ConfigFormat) -> Result<String, ConfigError> {
    match format {
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).map_err(|e| ConfigError::Render(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::to_string_pretty(config).map_err(|e| ConfigError::Render(e.to_string()))
        }
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).map_err(|e| ConfigError::Render(e.to_string()))
        }
    }
}

/// Checks that an optional key file exists and is not empty.
pub fn check_key_file(label: &str, path: Option<&Path>) -> Result<(), ConfigError> {
    let Some(path) = path else {
        return Ok(());
    };
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => Err(ConfigError::Invalid(format!(
            "{} file is empty: {}",
            label,
            path.display()
        ))),
        Ok(_) => Ok(()),
        Err(e) => Err(ConfigError::Invalid(format!(
            "{} file is not readable: {} ({})",
            label,
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        address: String,
        interval: u64,
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("c.json");
        fs::write(&json, r#"{"address":"a:1","interval":3}"#).unwrap();
        let cfg: Sample = load_file(Some(&json), &[]).unwrap();
        assert_eq!(cfg.address, "a:1");
        assert_eq!(cfg.interval, 3);

        let toml_path = dir.path().join("c.toml");
        fs::write(&toml_path, "address = \"b:2\"\n").unwrap();
        let cfg: Sample = load_file(Some(&toml_path), &[]).unwrap();
        assert_eq!(cfg.address, "b:2");
        assert_eq!(cfg.interval, 0);

        let yaml = dir.path().join("c.yaml");
        let mut f = fs::File::create(&yaml).unwrap();
        writeln!(f, "interval: 9").unwrap();
        let cfg: Sample = load_file(Some(&yaml), &[]).unwrap();
        assert_eq!(cfg.interval, 9);
    }

    #[test]
    fn test_missing_defaults_yield_default() {
        let cfg: Sample = load_file(None, &["/nonexistent/metric-track.yaml"]).unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let res: Result<Sample, _> = load_file(Some(Path::new("/nonexistent/c.json")), &[]);
        assert!(matches!(res, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("bad.json");
        fs::write(&json, "{not json").unwrap();
        let res: Result<Sample, _> = load_file(Some(&json), &[]);
        assert!(matches!(res, Err(ConfigError::Parse { .. })));
    }
}
