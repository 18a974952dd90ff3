use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::queue::QueueSettings;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub queue: QueueSettings,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Buffered events per broadcast channel; WebSocket consumers that
    /// lag past this are disconnected and must resync from a snapshot.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

fn default_channel_capacity() -> usize {
    256
}

/// Authentication configuration (admin lifecycle endpoints)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when method = "api_key"
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
    // Future: Oidc
}

/// Queue store backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database file, used when backend = "sqlite"
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("anteroom.db")
}

/// Available store backends
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process state, lost on restart. Tests and single-node dev.
    Memory,
    #[default]
    Sqlite,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub queue: QueueSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_key_configured: config
                    .auth
                    .api_key
                    .as_ref()
                    .map(|k| !k.is_empty())
                    .unwrap_or(false),
            },
            server: config.server.clone(),
            store: config.store.clone(),
            queue: config.queue.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PausedJoinPolicy;

    #[test]
    fn test_deserialize_valid_config_with_none_auth() {
        let toml = r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.auth.method, AuthMethod::None));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_with_default_sections() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.channel_capacity, 256);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.path.to_str().unwrap(), "anteroom.db");
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.queue.paused_join_policy, PausedJoinPolicy::Enqueue);
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_queue_section() {
        let toml = r#"
[auth]
method = "none"

[queue]
capacity = 5
active_window_secs = 120
paused_join_policy = "reject"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.queue.active_window_secs, 120);
        assert_eq!(config.queue.paused_join_policy, PausedJoinPolicy::Reject);
        // Unset knobs keep their defaults.
        assert_eq!(config.queue.ema_alpha, 0.2);
    }

    #[test]
    fn test_deserialize_memory_store() {
        let toml = r#"
[auth]
method = "none"

[store]
backend = "memory"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_sanitized_config_redacts_api_key() {
        let toml = r#"
[auth]
method = "api_key"
api_key = "super-secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.auth.method, "api_key");
        assert!(sanitized.auth.api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
    }
}
