use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Auth section exists (enforced by serde)
/// - api_key is set when auth method is "api_key"
/// - Server port is not 0
/// - Queue capacity, window and EMA factor are in range
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Auth validation
    if config.auth.method == AuthMethod::ApiKey
        && config
            .auth
            .api_key
            .as_ref()
            .map(|k| k.is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key must be set when auth.method is \"api_key\"".to_string(),
        ));
    }

    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }
    if config.server.channel_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "server.channel_capacity cannot be 0".to_string(),
        ));
    }

    // Queue validation
    if config.queue.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "queue.capacity must be at least 1".to_string(),
        ));
    }
    if config.queue.active_window_secs == 0 {
        return Err(ConfigError::ValidationError(
            "queue.active_window_secs must be at least 1".to_string(),
        ));
    }
    if !(config.queue.ema_alpha > 0.0 && config.queue.ema_alpha <= 1.0) {
        return Err(ConfigError::ValidationError(
            "queue.ema_alpha must be in (0, 1]".to_string(),
        ));
    }
    if config.queue.default_avg_service_ms < 0.0 {
        return Err(ConfigError::ValidationError(
            "queue.default_avg_service_ms cannot be negative".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[auth]
method = "none"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        let config = base_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_capacity_fails() {
        let mut config = base_config();
        config.queue.capacity = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_alpha_out_of_range_fails() {
        let mut config = base_config();
        config.queue.ema_alpha = 1.5;
        assert!(validate_config(&config).is_err());
        config.queue.ema_alpha = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_api_key_method_requires_key() {
        let mut config = base_config();
        config.auth.method = AuthMethod::ApiKey;
        config.auth.api_key = None;
        assert!(validate_config(&config).is_err());

        config.auth.api_key = Some("secret".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
