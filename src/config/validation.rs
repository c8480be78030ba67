//! Configuration validation logic.

use crate::config::schema::Config;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a Config for semantic correctness.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError("service.name must not be empty".to_string()));
    }
    if config.broker.uri.trim().is_empty() {
        errors.push(ValidationError("broker.uri must not be empty".to_string()));
    }
    if config.http.listen_port == 0 {
        errors.push(ValidationError("http.listen_port must be > 0".to_string()));
    }
    if config.dashboard.enabled && config.dashboard.listen_port == 0 {
        errors.push(ValidationError(
            "dashboard.listen_port must be > 0".to_string(),
        ));
    }
    if !config.http.fwd_host.starts_with("http://") && !config.http.fwd_host.starts_with("https://")
    {
        errors.push(ValidationError(format!(
            "http.fwd_host '{}' must be an http(s) URL",
            config.http.fwd_host
        )));
    }
    if config.message.receive_timeout_secs == 0 {
        errors.push(ValidationError(
            "message.receive_timeout_secs must be > 0".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn empty_service_name_is_rejected() {
        let mut config = Config::default();
        config.service.name = "  ".into();
        let errs = validate_config(&config).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].0.contains("service.name"));
    }

    #[test]
    fn bad_fwd_host_is_rejected() {
        let mut config = Config::default();
        config.http.fwd_host = "localhost:8000".into();
        let errs = validate_config(&config).unwrap_err();
        assert!(errs[0].0.contains("fwd_host"));
    }

    #[test]
    fn errors_accumulate() {
        let mut config = Config::default();
        config.service.name = String::new();
        config.http.listen_port = 0;
        config.message.receive_timeout_secs = 0;
        let errs = validate_config(&config).unwrap_err();
        assert_eq!(errs.len(), 3);
    }
}
