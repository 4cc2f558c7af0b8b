use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8080)
    pub port: u16,
    /// SQLite database URL (default: sqlite:./data/neuroverse.db)
    pub database_url: String,
    /// OIDC issuer URL for ID-token validation
    pub oidc_issuer: String,
    /// OIDC audience (client/project id)
    pub oidc_audience: String,
    /// Timeout for token-verification HTTP calls, in seconds (default: 5)
    pub verify_timeout_secs: u64,
    /// Log level (default: info)
    pub log_level: String,
    /// CORS allowed origins (comma-separated, default: *)
    pub cors_origins: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/neuroverse.db".to_string()),
            oidc_issuer: env::var("OIDC_ISSUER")
                .map_err(|_| ConfigError::MissingEnvVar("OIDC_ISSUER"))?,
            oidc_audience: env::var("OIDC_AUDIENCE")
                .map_err(|_| ConfigError::MissingEnvVar("OIDC_AUDIENCE"))?,
            verify_timeout_secs: env::var("AUTH_VERIFY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            cors_origins: env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string()),
        })
    }

    /// Configured CORS origins, or `None` when any origin is allowed.
    pub fn cors_origin_list(&self) -> Option<Vec<String>> {
        if self.cors_origins.trim() == "*" {
            return None;
        }
        Some(
            self.cors_origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid port number")]
    InvalidPort,
    #[error("Invalid verification timeout")]
    InvalidTimeout,
}

#[cfg(test)]
mod tests {
    use crate::test_util::test_config;

    #[test]
    fn test_wildcard_cors_means_any_origin() {
        let config = test_config();
        assert!(config.cors_origin_list().is_none());
    }

    #[test]
    fn test_cors_origin_list_splits_and_trims() {
        let mut config = test_config();
        config.cors_origins = "https://app.example.com, https://admin.example.com ,".to_string();
        assert_eq!(
            config.cors_origin_list().unwrap(),
            vec![
                "https://app.example.com".to_string(),
                "https://admin.example.com".to_string(),
            ]
        );
    }
}
