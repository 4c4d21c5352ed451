//! Postage configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required (purchasing)
//! - `INTERNETMARKE_USERNAME` - Portokasse account user (e-mail)
//! - `INTERNETMARKE_PASSWORD` - Portokasse account password
//! - `INTERNETMARKE_CLIENT_ID` - DHL API client ID
//! - `INTERNETMARKE_CLIENT_SECRET` - DHL API client secret
//! - `STAMPDESK_SENDER_ADDRESS` - Sender block printed on every postmark (multi-line)
//!
//! ## Optional
//! - `INTERNETMARKE_API_URL` - API base URL (default: `https://api-eu.dhl.com/post/de/shipping/im/v1`)
//! - `INTERNETMARKE_TIMEOUT_SECS` - HTTP timeout in seconds (default: 30)
//! - `STAMPDESK_MARKS_DIR` - Postmark cache directory (default: `./marks`)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use stampdesk_core::{Address, parse_address};
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "https://api-eu.dhl.com/post/de/shipping/im/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MARKS_DIR: &str = "./marks";

/// Template values seen in `.env` files (case-insensitive prefixes)
const PLACEHOLDER_PREFIXES: &[&str] = &[
    "your-",
    "your_",
    "<your",
    "changeme",
    "change-me",
    "replace",
    "placeholder",
    "example",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
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

/// Postage configuration.
#[derive(Debug, Clone)]
pub struct PostageConfig {
    /// Internetmarke API access
    pub internetmarke: InternetmarkeConfig,
    /// Directory holding `<key>.png` postmarks
    pub marks_dir: PathBuf,
    /// Parsed sender address
    pub sender: Address,
}

/// Internetmarke API configuration.
///
/// Implements `Debug` manually to redact the account password and client secret.
#[derive(Clone)]
pub struct InternetmarkeConfig {
    /// API base URL (without trailing slash)
    pub api_url: Url,
    /// Portokasse user
    pub username: String,
    /// Portokasse password
    pub password: SecretString,
    /// API client ID
    pub client_id: String,
    /// API client secret
    pub client_secret: SecretString,
    /// Timeout applied to every HTTP request
    pub timeout: Duration,
}

impl std::fmt::Debug for InternetmarkeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternetmarkeConfig")
            .field("api_url", &self.api_url.as_str())
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PostageConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the client secret is still a placeholder value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let internetmarke = InternetmarkeConfig::from_env()?;
        let marks_dir = Self::marks_dir_from_env();
        let sender = parse_sender(&get_required_env("STAMPDESK_SENDER_ADDRESS")?)?;

        Ok(Self {
            internetmarke,
            marks_dir,
            sender,
        })
    }

    /// Cache directory only, for commands that never talk to the API.
    #[must_use]
    pub fn marks_dir_from_env() -> PathBuf {
        let _ = dotenvy::dotenv();
        PathBuf::from(get_env_or_default("STAMPDESK_MARKS_DIR", DEFAULT_MARKS_DIR))
    }
}

impl InternetmarkeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_url = parse_api_url(&get_env_or_default("INTERNETMARKE_API_URL", DEFAULT_API_URL))?;
        let timeout = parse_timeout(&get_env_or_default(
            "INTERNETMARKE_TIMEOUT_SECS",
            &DEFAULT_TIMEOUT_SECS.to_string(),
        ))?;

        Ok(Self {
            api_url,
            username: get_required_env("INTERNETMARKE_USERNAME")?,
            password: get_required_secret("INTERNETMARKE_PASSWORD")?,
            client_id: get_required_env("INTERNETMARKE_CLIENT_ID")?,
            client_secret: get_validated_secret("INTERNETMARKE_CLIENT_SECRET")?,
            timeout,
        })
    }

    /// Base URL as a string without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.api_url.as_str().trim_end_matches('/')
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

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_api_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar("INTERNETMARKE_API_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "INTERNETMARKE_API_URL".to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    let secs = value.parse::<u64>().map_err(|e| {
        ConfigError::InvalidEnvVar("INTERNETMARKE_TIMEOUT_SECS".to_string(), e.to_string())
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            "INTERNETMARKE_TIMEOUT_SECS".to_string(),
            "timeout must be at least 1 second".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse the sender block; postmarks are rejected without a full sender.
fn parse_sender(text: &str) -> Result<Address, ConfigError> {
    let sender = parse_address(text);
    if sender.name.is_empty() || sender.street.is_empty() || sender.postal_code.is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            "STAMPDESK_SENDER_ADDRESS".to_string(),
            "sender needs a name, a street and a postal code line".to_string(),
        ));
    }
    Ok(sender)
}

/// Reject secrets that are still the template text from `.env.example`.
///
/// The client secret is issued by DHL, so only obvious placeholders are
/// refused; its shape is not judged.
fn reject_placeholder_secret(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.trim().to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (starts with '{pattern}'). Copy the secret from the DHL developer portal."),
        ));
    }
    if lower.chars().all(|c| matches!(c, 'x' | '*' | '.' | '<' | '>')) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "appears to be masked or blank".to_string(),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    reject_placeholder_secret(&value, key)?;
    Ok(SecretString::from(value))
}
