/*!
 * Configuration Module
 *
 * Handles application configuration loading from environment variables
 * and provides structured access to configuration values.
 */

use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// PMS upstream client configuration
    pub pms: PmsConfig,
    /// Cache TTLs and maintenance cadence
    pub cache: CacheConfig,
    /// Booking coordinator configuration
    pub booking: BookingConfig,
    /// Webhook authentication configuration
    pub webhook: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
    /// Environment (development, production)
    pub environment: String,
    /// Default IANA timezone for clinics with a missing or invalid value
    pub default_timezone: String,
    /// Wall-clock deadline for a single webhook request
    pub request_deadline: Duration,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout: Duration,
    /// Idle connection timeout in seconds
    pub idle_timeout: Duration,
    /// Maximum connection lifetime in seconds
    pub max_lifetime: Duration,
}

/// PMS upstream client configuration.
///
/// Per-clinic credentials are NOT configured here; they are read from the
/// clinic record. This section carries only transport-level settings.
#[derive(Debug, Clone)]
pub struct PmsConfig {
    /// PMS host; the shard is interpolated as `https://api.<shard>.<host>/v1`
    pub host: String,
    /// Individual request timeout
    pub request_timeout: Duration,
    /// Maximum retry attempts for retryable failures
    pub max_retries: u32,
    /// Initial backoff delay; doubled per retry with jitter
    pub backoff_base: Duration,
    /// Backoff ceiling
    pub backoff_cap: Duration,
    /// Maximum in-flight requests per clinic
    pub per_clinic_concurrency: usize,
}

/// Cache TTLs and the maintenance task cadence
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Availability cache TTL
    pub availability_ttl: Duration,
    /// Booking context TTL
    pub booking_context_ttl: Duration,
    /// Patient lookup cache TTL
    pub patient_lookup_ttl: Duration,
    /// Service match cache TTL
    pub service_match_ttl: Duration,
    /// Maintenance task interval
    pub maintenance_interval: Duration,
}

/// Booking coordinator configuration
#[derive(Debug, Clone)]
pub struct BookingConfig {
    /// Booking lock TTL
    pub lock_ttl: Duration,
    /// Failed booking attempt suppression TTL
    pub failed_attempt_ttl: Duration,
    /// Session rejected-slot TTL
    pub rejected_slot_ttl: Duration,
    /// Default find-next-available search horizon in days
    pub default_max_days: u32,
    /// Hard ceiling on the find-next-available horizon
    pub max_max_days: u32,
}

/// Webhook authentication configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Static API key expected in the X-API-Key header
    pub api_key: String,
    /// Name of the header carrying the API key
    pub api_key_header: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing
    /// or contain invalid values.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            server: ServerConfig {
                host: env_or("SERVER_HOST", "0.0.0.0"),
                port: env_parse("SERVER_PORT", 8000),
                environment: env_or("ENVIRONMENT", "development"),
                default_timezone: env_or("DEFAULT_TIMEZONE", "Australia/Sydney"),
                request_deadline: Duration::from_secs(env_parse("REQUEST_DEADLINE_SECS", 25)),
            },

            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 20),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 5),
                acquire_timeout: Duration::from_secs(env_parse("DATABASE_CONNECT_TIMEOUT", 30)),
                idle_timeout: Duration::from_secs(env_parse("DATABASE_IDLE_TIMEOUT", 600)),
                max_lifetime: Duration::from_secs(env_parse("DATABASE_MAX_LIFETIME", 1800)),
            },

            pms: PmsConfig {
                host: env_or("PMS_HOST", "pms.example.com"),
                request_timeout: Duration::from_secs(env_parse("PMS_REQUEST_TIMEOUT", 30)),
                max_retries: env_parse("PMS_MAX_RETRIES", 3),
                backoff_base: Duration::from_millis(env_parse("PMS_BACKOFF_BASE_MS", 500)),
                backoff_cap: Duration::from_secs(env_parse("PMS_BACKOFF_CAP_SECS", 8)),
                per_clinic_concurrency: env_parse("PMS_PER_CLINIC_CONCURRENCY", 6),
            },

            cache: CacheConfig {
                availability_ttl: Duration::from_secs(env_parse("CACHE_AVAILABILITY_TTL", 900)),
                booking_context_ttl: Duration::from_secs(env_parse("CACHE_CONTEXT_TTL", 3600)),
                patient_lookup_ttl: Duration::from_secs(env_parse("CACHE_PATIENT_TTL", 86400)),
                service_match_ttl: Duration::from_secs(env_parse("CACHE_SERVICE_MATCH_TTL", 604800)),
                maintenance_interval: Duration::from_secs(env_parse("CACHE_MAINTENANCE_INTERVAL", 300)),
            },

            booking: BookingConfig {
                lock_ttl: Duration::from_secs(env_parse("BOOKING_LOCK_TTL", 120)),
                failed_attempt_ttl: Duration::from_secs(env_parse("FAILED_ATTEMPT_TTL", 7200)),
                rejected_slot_ttl: Duration::from_secs(env_parse("REJECTED_SLOT_TTL", 3600)),
                default_max_days: env_parse("FIND_NEXT_DEFAULT_DAYS", 14),
                max_max_days: env_parse("FIND_NEXT_MAX_DAYS", 30),
            },

            webhook: WebhookConfig {
                api_key: env_or("WEBHOOK_API_KEY", ""),
                api_key_header: env_or("WEBHOOK_API_KEY_HEADER", "x-api-key"),
            },
        };

        if config.server.environment == "production" && config.webhook.api_key.is_empty() {
            anyhow::bail!("WEBHOOK_API_KEY must be set in production");
        }

        Ok(config)
    }
}

/// Read an environment variable with a string default
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, falling back to the default on
/// missing or unparseable values
fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_defaults() {
        std::env::remove_var("VOICEBOOK_TEST_MISSING");
        let port: u16 = env_parse("VOICEBOOK_TEST_MISSING", 8000);
        assert_eq!(port, 8000);
    }

    #[test]
    fn test_env_parse_invalid_falls_back() {
        std::env::set_var("VOICEBOOK_TEST_INVALID", "not-a-number");
        let value: u32 = env_parse("VOICEBOOK_TEST_INVALID", 42);
        assert_eq!(value, 42);
        std::env::remove_var("VOICEBOOK_TEST_INVALID");
    }
}
