use super::{types::Config, ConfigError};

/// Validate configuration.
///
/// Rejects values that would make the service unusable at runtime: a zero
/// port, zero retries or concurrency, zero timeouts, a step timeout longer
/// than the overall deadline, an empty data dir and malformed URLs.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let acquisition = &config.acquisition;
    if acquisition.max_retries == 0 {
        return Err(invalid("acquisition.max_retries must be at least 1"));
    }
    if acquisition.step_timeout_secs == 0 {
        return Err(invalid("acquisition.step_timeout_secs cannot be 0"));
    }
    if acquisition.overall_deadline_secs == 0 {
        return Err(invalid("acquisition.overall_deadline_secs cannot be 0"));
    }
    if acquisition.step_timeout_secs > acquisition.overall_deadline_secs {
        return Err(invalid(
            "acquisition.step_timeout_secs cannot exceed acquisition.overall_deadline_secs",
        ));
    }
    if acquisition.backoff_multiplier < 1.0 {
        return Err(invalid("acquisition.backoff_multiplier must be >= 1.0"));
    }

    if config.storage.data_dir.as_os_str().is_empty() {
        return Err(invalid("storage.data_dir cannot be empty"));
    }

    if config.dispatcher.concurrency_limit == 0 {
        return Err(invalid("dispatcher.concurrency_limit must be at least 1"));
    }

    let notification = &config.notification;
    if notification.timeout_secs == 0 {
        return Err(invalid("notification.timeout_secs cannot be 0"));
    }
    if notification.max_attempts == 0 {
        return Err(invalid("notification.max_attempts must be at least 1"));
    }
    if let Some(ref target) = notification.target {
        check_url("notification.target", target)?;
    }

    check_url("storage.public_base_url", &config.storage.public_base_url)?;
    check_url("portal.base_url", &config.portal.base_url)?;
    check_url("webdriver.url", &config.webdriver.url)?;

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "{} must be an http(s) URL, got '{}'",
            field, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_retries_fails() {
        let mut config = Config::default();
        config.acquisition.max_retries = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_step_timeout_above_deadline_fails() {
        let mut config = Config::default();
        config.acquisition.step_timeout_secs = 400;
        config.acquisition.overall_deadline_secs = 300;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("step_timeout_secs"));
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = Config::default();
        config.dispatcher.concurrency_limit = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_notification_target_fails() {
        let mut config = Config::default();
        config.notification.target = Some("ftp://somewhere".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("notification.target"));
    }
}
