//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load a configuration from a TOML file without validating it.
///
/// Callers that apply command-line overrides validate afterwards.
pub fn read_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "marquee-{}-{}.toml",
            name,
            std::process::id()
        ));
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_valid_file() {
        let path = write_temp(
            "valid",
            "[rate_limit]\nrequests_per_second = 5.5\nburst = 8\n",
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.rate_limit.requests_per_second, 5.5);
        assert_eq!(config.rate_limit.burst, 8);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn rejects_invalid_values() {
        let path = write_temp("invalid", "[rate_limit]\nburst = 0\n");
        let err = load_config(&path).unwrap_err();
        match &err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation error, got {:?}", other),
        }
        let message = err.to_string();
        assert!(message.starts_with("invalid configuration: "), "{message}");
        assert!(message.contains("rate_limit.burst"), "{message}");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/marquee.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().starts_with("cannot read config file: "));
    }

    #[test]
    fn reports_malformed_toml() {
        let path = write_temp("malformed", "[rate_limit\nburst = 8\n");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("invalid TOML: "));
        let _ = fs::remove_file(path);
    }
}
