//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // GDPR compliance engine
    pub auth_shared_secret: String,
    pub export_dir: String,
    pub webhook_default_timeout_secs: u64,
    pub webhook_default_retries: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            auth_shared_secret: {
                let secret = env::var("AUTH_SHARED_SECRET")
                    .map_err(|_| ConfigError::Missing("AUTH_SHARED_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "AUTH_SHARED_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            export_dir: env::var("GDPR_EXPORT_DIR").unwrap_or_else(|_| "/tmp/gdpr-exports".to_string()),
            webhook_default_timeout_secs: env::var("WEBHOOK_DEFAULT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            webhook_default_retries: env::var("WEBHOOK_DEFAULT_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
        })
    }

    /// Builds the Resend email configuration this process' notification
    /// service sends through. Reads straight from the environment rather
    /// than duplicating fields already owned by [`Config`].
    pub fn resend_config(&self) -> plexmcp_compliance::notification::ResendConfig {
        plexmcp_compliance::notification::ResendConfig::from_env()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static CONFIG_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "AUTH_SHARED_SECRET",
            "test-operator-secret-must-be-at-least-32-chars",
        );
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("AUTH_SHARED_SECRET");
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        cleanup_config();
        env::set_var(
            "AUTH_SHARED_SECRET",
            "test-operator-secret-must-be-at-least-32-chars",
        );

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));

        cleanup_config();
    }

    #[test]
    fn weak_auth_secret_is_rejected() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        setup_minimal_config();
        env::set_var("AUTH_SHARED_SECRET", "too-short");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    fn valid_config_is_accepted() {
        let _lock = CONFIG_TEST_MUTEX.lock().unwrap();
        setup_minimal_config();

        let result = Config::from_env();
        assert!(result.is_ok());

        cleanup_config();
    }
}
