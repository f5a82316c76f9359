//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use betzona::db::DatabaseConfig;
use rust_decimal::Decimal;
use std::{net::SocketAddr, time::Duration};

const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Account defaults
    pub accounts: AccountsConfig,
    /// Per-IP request limits
    pub rate_limit: RateLimitConfig,
    /// Read-through cache of bet queries
    pub cache: CacheConfig,
    /// Prometheus scrape endpoint, disabled when `None`
    pub metrics_bind: Option<SocketAddr>,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// JWT signing secret (required)
    pub jwt_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
    /// Access token lifetime
    pub jwt_duration_hours: i64,
}

#[derive(Debug, Clone)]
pub struct AccountsConfig {
    /// Balance credited to every new account
    pub starting_balance: Decimal,
    /// Emails granted the admin role at registration
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND));

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let password_pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let starting_balance = match std::env::var("STARTING_BALANCE") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "STARTING_BALANCE".to_string(),
                reason: format!("'{raw}' is not a decimal amount"),
            })?,
            Err(_) => Decimal::ZERO,
        };

        let admin_emails = std::env::var("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{raw}' is not a socket address"),
                })?)
            }
            _ => None,
        };

        Ok(ServerConfig {
            bind,
            database,
            security: SecurityConfig {
                jwt_secret,
                password_pepper,
                jwt_duration_hours: parse_env_or("JWT_DURATION_HOURS", 24),
            },
            accounts: AccountsConfig {
                starting_balance,
                admin_emails,
            },
            rate_limit: RateLimitConfig {
                max_requests: parse_env_or("RATE_LIMIT_REQUESTS", 100),
                window_secs: parse_env_or("RATE_LIMIT_WINDOW_SECS", 60),
            },
            cache: CacheConfig {
                enabled: parse_env_or("CACHE_ENABLED", true),
                ttl_secs: parse_env_or("CACHE_TTL_SECS", 300),
            },
            metrics_bind,
        })
    }

    /// Defaults with explicit secrets, no environment access
    pub fn with_secrets(jwt_secret: impl Into<String>, password_pepper: impl Into<String>) -> Self {
        ServerConfig {
            bind: SocketAddr::from(DEFAULT_BIND),
            database: DatabaseConfig::development(),
            security: SecurityConfig {
                jwt_secret: jwt_secret.into(),
                password_pepper: password_pepper.into(),
                jwt_duration_hours: 24,
            },
            accounts: AccountsConfig {
                starting_balance: Decimal::ZERO,
                admin_emails: Vec::new(),
            },
            rate_limit: RateLimitConfig {
                max_requests: 100,
                window_secs: 60,
            },
            cache: CacheConfig {
                enabled: true,
                ttl_secs: 300,
            },
            metrics_bind: None,
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if self.security.jwt_duration_hours <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_DURATION_HOURS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.accounts.starting_balance < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                var: "STARTING_BALANCE".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_REQUESTS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_WINDOW_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "CACHE_TTL_SECS".to_string(),
                reason: "Must be greater than 0 when the cache is enabled".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServerConfig {
        ServerConfig::with_secrets("a".repeat(32), "b".repeat(16))
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = valid();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let config = ServerConfig::with_secrets("short", "b".repeat(16));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "JWT_SECRET"));
    }

    #[test]
    fn test_negative_starting_balance_rejected() {
        let mut config = valid();
        config.accounts.starting_balance = Decimal::NEGATIVE_ONE;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = valid();
        config.rate_limit.max_requests = 0;
        assert!(config.validate().is_err());
    }
}
