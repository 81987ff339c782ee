//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront (used for the Webpay return URL)
//! - `WEBPAY_API_KEY_ID` - Transbank commerce code
//! - `WEBPAY_API_KEY_SECRET` - Transbank API secret key
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `WEBPAY_API_BASE_URL` - Webpay REST base (default: integration environment)
//! - `WEBPAY_CREATE_TIMEOUT_SECS` - Transaction creation timeout (default: 10)
//! - `WEBPAY_COMMIT_TIMEOUT_SECS` - Transaction commit timeout (default: 15)
//! - `GEO_API_BASE_URL` - DPA API base (default: <https://apis.digital.gob.cl/dpa>)
//! - `GEO_TIMEOUT_SECS` - Per-attempt timeout (default: 8)
//! - `GEO_RETRIES` - Retries after the first attempt (default: 2)
//! - `GEO_BACKOFF_MS` - Linear backoff step (default: 500)
//! - `GEO_CACHE_TTL_SECS` - Cache TTL (default: 604800, 7 days)
//! - `GEO_SNAPSHOT_DIR` - Directory with `regiones.json` / `comunas_by_region.json`
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD` - Order e-mails (disabled when `SMTP_HOST` is unset)
//! - `EMAIL_FROM` - Sender address (default: no-reply@localhost)
//! - `ADMIN_EMAILS` - Comma-separated addresses that get a copy of order e-mails
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Transbank integration environment.
pub const WEBPAY_INTEGRATION_URL: &str =
    "https://webpay3gint.transbank.cl/rswebpaytransaction/api/webpay/v1.2";

/// Public DPA (División Político Administrativa) API.
pub const DPA_BASE_URL: &str = "https://apis.digital.gob.cl/dpa";

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Regions / comunas resolver
    pub geo: GeoConfig,
    /// Webpay REST API
    pub webpay: WebpayConfig,
    /// SMTP settings; `None` disables order e-mails
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Error event sample rate
    pub sentry_sample_rate: f32,
    /// Performance trace sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Geo resolver configuration.
#[derive(Debug, Clone)]
pub struct GeoConfig {
    /// DPA API base URL, without trailing slash
    pub api_base_url: String,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Retries after the first failed attempt
    pub retries: u32,
    /// Sleep after attempt `n` (1-based) is `n * backoff_step`
    pub backoff_step: Duration,
    /// How long a resolved list stays cached
    pub cache_ttl: Duration,
    /// Directory holding the local snapshot files
    pub snapshot_dir: PathBuf,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            api_base_url: DPA_BASE_URL.to_string(),
            timeout: Duration::from_secs(8),
            retries: 2,
            backoff_step: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(60 * 60 * 24 * 7),
            snapshot_dir: PathBuf::from("crates/storefront/data"),
        }
    }
}

/// Webpay (Transbank) configuration.
///
/// Implements `Debug` manually to redact the API secret.
#[derive(Clone)]
pub struct WebpayConfig {
    /// REST base URL including the API version path
    pub api_base_url: String,
    /// Commerce code, sent as `Tbk-Api-Key-Id`
    pub api_key_id: String,
    /// Secret, sent as `Tbk-Api-Key-Secret`
    pub api_key_secret: SecretString,
    /// Timeout for transaction creation
    pub create_timeout: Duration,
    /// Timeout for transaction commit
    pub commit_timeout: Duration,
}

impl std::fmt::Debug for WebpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebpayConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key_id", &self.api_key_id)
            .field("api_key_secret", &"[REDACTED]")
            .field("create_timeout", &self.create_timeout)
            .field("commit_timeout", &self.commit_timeout)
            .finish()
    }
}

/// SMTP configuration for order notifications.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    pub from_address: String,
    /// Copies of every order e-mail go here
    pub admin_recipients: Vec<String>,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("admin_recipients", &self.admin_recipients)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = parse_env_or_default("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
        })?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            geo: GeoConfig::from_env()?,
            webpay: WebpayConfig::from_env()?,
            email: EmailConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Absolute URL for a storefront path.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

impl GeoConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            api_base_url: get_env_or_default("GEO_API_BASE_URL", DPA_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(parse_env_or_default("GEO_TIMEOUT_SECS", "8")?),
            retries: parse_env_or_default("GEO_RETRIES", "2")?,
            backoff_step: Duration::from_millis(parse_env_or_default("GEO_BACKOFF_MS", "500")?),
            cache_ttl: Duration::from_secs(parse_env_or_default("GEO_CACHE_TTL_SECS", "604800")?),
            snapshot_dir: get_optional_env("GEO_SNAPSHOT_DIR")
                .map_or(defaults.snapshot_dir, PathBuf::from),
        })
    }
}

impl WebpayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: get_env_or_default("WEBPAY_API_BASE_URL", WEBPAY_INTEGRATION_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key_id: get_required_env("WEBPAY_API_KEY_ID")?,
            api_key_secret: get_validated_secret("WEBPAY_API_KEY_SECRET")?,
            create_timeout: Duration::from_secs(parse_env_or_default(
                "WEBPAY_CREATE_TIMEOUT_SECS",
                "10",
            )?),
            commit_timeout: Duration::from_secs(parse_env_or_default(
                "WEBPAY_COMMIT_TIMEOUT_SECS",
                "15",
            )?),
        })
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env_or_default("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_env_or_default("EMAIL_FROM", "no-reply@localhost"),
            admin_recipients: parse_list(&get_env_or_default("ADMIN_EMAILS", "")),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable (empty counts as unset).
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
