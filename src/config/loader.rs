//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::Config;
use crate::config::validation::{validate_config, ValidationError};

/// Why a configuration file could not be turned into a usable [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|err| err.0.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    validate_config(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }

    #[test]
    fn invalid_variant_joins_all_failures() {
        let err = ConfigError::Invalid(vec![
            ValidationError("service.name must not be empty".into()),
            ValidationError("http.listen_port must be > 0".into()),
        ]);
        let message = err.to_string();
        assert!(message.contains("service.name"));
        assert!(message.contains("; http.listen_port"));
    }
}
