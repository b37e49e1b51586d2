//! Configuration management
//!
//! This module handles loading and parsing configuration for ISBank.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. Identifiers for
//! the external services (project id, database id, collection ids, API keys)
//! are opaque strings and are passed through untouched.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Identity service (Appwrite accounts API)
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Bank aggregation service (Plaid)
    #[serde(default)]
    pub aggregation: AggregationConfig,
    /// Payment rail (Dwolla)
    #[serde(default)]
    pub rail: RailConfig,
    /// Bank account record storage
    #[serde(default)]
    pub store: StoreConfig,
    /// Accounts view cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Outbound HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the web front end, cookies are sent with credentials)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the cookie holding the session secret
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the cookie `Secure`. Only disable for plain-http local development.
    #[serde(default = "default_true")]
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secure: true,
        }
    }
}

fn default_cookie_name() -> String {
    "appwrite-session".to_string()
}

fn default_true() -> bool {
    true
}

/// Identity service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// API endpoint, e.g. `https://cloud.appwrite.io/v1`
    #[serde(default = "default_identity_endpoint")]
    pub endpoint: String,
    /// Project identifier
    #[serde(default)]
    pub project_id: String,
    /// Server API key used for account and session creation
    #[serde(default)]
    pub api_key: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: default_identity_endpoint(),
            project_id: String::new(),
            api_key: String::new(),
        }
    }
}

fn default_identity_endpoint() -> String {
    "https://cloud.appwrite.io/v1".to_string()
}

/// Aggregation environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationEnvironment {
    /// Test institutions and credentials (default)
    #[default]
    Sandbox,
    /// Live institutions, limited items
    Development,
    /// Live institutions
    Production,
}

impl AggregationEnvironment {
    /// Base URL of the aggregation API for this environment
    pub fn base_url(&self) -> &'static str {
        match self {
            AggregationEnvironment::Sandbox => "https://sandbox.plaid.com",
            AggregationEnvironment::Development => "https://development.plaid.com",
            AggregationEnvironment::Production => "https://production.plaid.com",
        }
    }
}

/// Aggregation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Environment selecting the API host
    #[serde(default)]
    pub environment: AggregationEnvironment,
    /// Client id
    #[serde(default)]
    pub client_id: String,
    /// Client secret
    #[serde(default)]
    pub secret: String,
    /// Name shown to the user inside the linking widget
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// API host override, e.g. an egress proxy. Unset uses the environment host.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            environment: AggregationEnvironment::default(),
            client_id: String::new(),
            secret: String::new(),
            client_name: default_client_name(),
            base_url: None,
        }
    }
}

impl AggregationConfig {
    /// Host every aggregation request goes to
    pub fn api_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.environment.base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

fn default_client_name() -> String {
    "ISBank".to_string()
}

/// Payment rail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailConfig {
    /// API base URL
    #[serde(default = "default_rail_base_url")]
    pub base_url: String,
    /// Application key
    #[serde(default)]
    pub key: String,
    /// Application secret
    #[serde(default)]
    pub secret: String,
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            base_url: default_rail_base_url(),
            key: String::new(),
            secret: String::new(),
        }
    }
}

fn default_rail_base_url() -> String {
    "https://api-sandbox.dwolla.com".to_string()
}

/// Bank account storage driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    /// Hosted document store (default)
    #[default]
    Appwrite,
    /// Local SQLite database
    Sqlite,
}

/// Bank account storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage driver
    #[serde(default)]
    pub driver: StoreDriver,
    /// Document store database id
    #[serde(default)]
    pub database_id: String,
    /// Document store collection holding user documents. Empty disables the
    /// rail customer lookup there.
    #[serde(default)]
    pub user_collection_id: String,
    /// Document store collection holding bank account documents
    #[serde(default)]
    pub bank_collection_id: String,
    /// SQLite database URL, used by the `sqlite` driver
    #[serde(default = "default_sqlite_url")]
    pub sqlite_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::default(),
            database_id: String::new(),
            user_collection_id: String::new(),
            bank_collection_id: String::new(),
            sqlite_url: default_sqlite_url(),
        }
    }
}

fn default_sqlite_url() -> String {
    "data/isbank.db".to_string()
}

/// Accounts view cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds. Unset keeps the client default.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl HttpConfig {
    /// Build the shared reqwest client used by every gateway
    pub fn build_client(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(builder.build()?)
    }
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `ISBANK_<SECTION>_<FIELD>`:
    /// - ISBANK_SERVER_HOST, ISBANK_SERVER_PORT, ISBANK_SERVER_CORS_ORIGIN
    /// - ISBANK_SESSION_COOKIE_NAME, ISBANK_SESSION_SECURE
    /// - ISBANK_IDENTITY_ENDPOINT, ISBANK_IDENTITY_PROJECT_ID, ISBANK_IDENTITY_API_KEY
    /// - ISBANK_AGGREGATION_ENVIRONMENT, ISBANK_AGGREGATION_CLIENT_ID, ISBANK_AGGREGATION_SECRET,
    ///   ISBANK_AGGREGATION_CLIENT_NAME, ISBANK_AGGREGATION_BASE_URL
    /// - ISBANK_RAIL_BASE_URL, ISBANK_RAIL_KEY, ISBANK_RAIL_SECRET
    /// - ISBANK_STORE_DRIVER, ISBANK_STORE_DATABASE_ID, ISBANK_STORE_USER_COLLECTION_ID,
    ///   ISBANK_STORE_BANK_COLLECTION_ID, ISBANK_STORE_SQLITE_URL
    /// - ISBANK_CACHE_TTL_SECONDS, ISBANK_HTTP_TIMEOUT_SECONDS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        override_string("ISBANK_SERVER_HOST", &mut self.server.host);
        override_parsed("ISBANK_SERVER_PORT", &mut self.server.port);
        override_string("ISBANK_SERVER_CORS_ORIGIN", &mut self.server.cors_origin);

        override_string("ISBANK_SESSION_COOKIE_NAME", &mut self.session.cookie_name);
        override_parsed("ISBANK_SESSION_SECURE", &mut self.session.secure);

        override_string("ISBANK_IDENTITY_ENDPOINT", &mut self.identity.endpoint);
        override_string("ISBANK_IDENTITY_PROJECT_ID", &mut self.identity.project_id);
        override_string("ISBANK_IDENTITY_API_KEY", &mut self.identity.api_key);

        if let Ok(env) = std::env::var("ISBANK_AGGREGATION_ENVIRONMENT") {
            match env.to_lowercase().as_str() {
                "sandbox" => self.aggregation.environment = AggregationEnvironment::Sandbox,
                "development" => self.aggregation.environment = AggregationEnvironment::Development,
                "production" => self.aggregation.environment = AggregationEnvironment::Production,
                _ => {} // Ignore invalid values
            }
        }
        override_string("ISBANK_AGGREGATION_CLIENT_ID", &mut self.aggregation.client_id);
        override_string("ISBANK_AGGREGATION_SECRET", &mut self.aggregation.secret);
        override_string("ISBANK_AGGREGATION_CLIENT_NAME", &mut self.aggregation.client_name);
        if let Ok(url) = std::env::var("ISBANK_AGGREGATION_BASE_URL") {
            self.aggregation.base_url = Some(url);
        }

        override_string("ISBANK_RAIL_BASE_URL", &mut self.rail.base_url);
        override_string("ISBANK_RAIL_KEY", &mut self.rail.key);
        override_string("ISBANK_RAIL_SECRET", &mut self.rail.secret);

        if let Ok(driver) = std::env::var("ISBANK_STORE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "appwrite" => self.store.driver = StoreDriver::Appwrite,
                "sqlite" => self.store.driver = StoreDriver::Sqlite,
                _ => {} // Ignore invalid values
            }
        }
        override_string("ISBANK_STORE_DATABASE_ID", &mut self.store.database_id);
        override_string("ISBANK_STORE_USER_COLLECTION_ID", &mut self.store.user_collection_id);
        override_string("ISBANK_STORE_BANK_COLLECTION_ID", &mut self.store.bank_collection_id);
        override_string("ISBANK_STORE_SQLITE_URL", &mut self.store.sqlite_url);

        override_parsed("ISBANK_CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds);

        if let Ok(timeout) = std::env::var("ISBANK_HTTP_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.http.timeout_seconds = Some(timeout);
            }
        }
    }
}

fn override_string(key: &str, target: &mut String) {
    if let Ok(value) = std::env::var(key) {
        *target = value;
    }
}

/// Unparseable values keep the current setting
fn override_parsed<T: std::str::FromStr>(key: &str, target: &mut T) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.parse::<T>() {
            *target = parsed;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_KEYS: &[&str] = &[
        "ISBANK_SERVER_HOST",
        "ISBANK_SERVER_PORT",
        "ISBANK_SESSION_COOKIE_NAME",
        "ISBANK_SESSION_SECURE",
        "ISBANK_AGGREGATION_ENVIRONMENT",
        "ISBANK_AGGREGATION_CLIENT_ID",
        "ISBANK_STORE_DRIVER",
        "ISBANK_STORE_DATABASE_ID",
        "ISBANK_STORE_USER_COLLECTION_ID",
        "ISBANK_STORE_BANK_COLLECTION_ID",
        "ISBANK_AGGREGATION_BASE_URL",
        "ISBANK_CACHE_TTL_SECONDS",
        "ISBANK_HTTP_TIMEOUT_SECONDS",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.session.cookie_name, "appwrite-session");
        assert!(config.session.secure);
        assert_eq!(config.aggregation.environment, AggregationEnvironment::Sandbox);
        assert_eq!(config.aggregation.client_name, "ISBank");
        assert_eq!(config.rail.base_url, "https://api-sandbox.dwolla.com");
        assert_eq!(config.store.driver, StoreDriver::Appwrite);
        assert_eq!(config.cache.ttl_seconds, 300);
        assert!(config.http.timeout_seconds.is_none());
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.sqlite_url, "data/isbank.db");
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 3000\nstore:\n  driver: sqlite\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.store.driver, StoreDriver::Sqlite);
        assert_eq!(config.store.sqlite_url, "data/isbank.db");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
session:
  cookie_name: "sid"
  secure: false
identity:
  endpoint: "https://identity.example.com/v1"
  project_id: "proj"
  api_key: "key"
aggregation:
  environment: development
  client_id: "client"
  secret: "shh"
  client_name: "My Bank App"
rail:
  base_url: "https://rail.example.com"
  key: "rk"
  secret: "rs"
store:
  driver: appwrite
  database_id: "db"
  user_collection_id: "users"
  bank_collection_id: "banks"
cache:
  ttl_seconds: 60
http:
  timeout_seconds: 15
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.session.cookie_name, "sid");
        assert!(!config.session.secure);
        assert_eq!(config.identity.project_id, "proj");
        assert_eq!(config.aggregation.environment, AggregationEnvironment::Development);
        assert_eq!(config.aggregation.client_name, "My Bank App");
        assert_eq!(config.rail.key, "rk");
        assert_eq!(config.store.user_collection_id, "users");
        assert_eq!(config.store.bank_collection_id, "banks");
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.http.timeout_seconds, Some(15));
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        let err_msg = err.to_string();
        assert!(err_msg.contains("parse"));
        assert!(err_msg.contains("line"));
    }

    #[test]
    fn test_aggregation_environment_base_urls() {
        assert_eq!(
            AggregationEnvironment::Sandbox.base_url(),
            "https://sandbox.plaid.com"
        );
        assert_eq!(
            AggregationEnvironment::Production.base_url(),
            "https://production.plaid.com"
        );
    }

    #[test]
    fn test_aggregation_base_url_override() {
        let mut config = AggregationConfig::default();
        assert_eq!(config.api_base_url(), "https://sandbox.plaid.com");

        config.base_url = Some("  ".to_string());
        assert_eq!(config.api_base_url(), "https://sandbox.plaid.com");

        config.base_url = Some("https://plaid-proxy.internal/".to_string());
        assert_eq!(config.api_base_url(), "https://plaid-proxy.internal");
    }

    #[test]
    fn test_env_override_server_and_session() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("ISBANK_SERVER_HOST", "192.168.1.1");
        std::env::set_var("ISBANK_SERVER_PORT", "4000");
        std::env::set_var("ISBANK_SESSION_COOKIE_NAME", "custom-session");
        std::env::set_var("ISBANK_SESSION_SECURE", "false");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.session.cookie_name, "custom-session");
        assert!(!config.session.secure);

        clear_env();
    }

    #[test]
    fn test_env_override_external_services() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        std::env::set_var("ISBANK_AGGREGATION_ENVIRONMENT", "Production");
        std::env::set_var("ISBANK_AGGREGATION_CLIENT_ID", "from-env");
        std::env::set_var("ISBANK_STORE_DRIVER", "sqlite");
        std::env::set_var("ISBANK_STORE_DATABASE_ID", "db-env");
        std::env::set_var("ISBANK_STORE_USER_COLLECTION_ID", "users-env");
        std::env::set_var("ISBANK_STORE_BANK_COLLECTION_ID", "banks-env");
        std::env::set_var("ISBANK_AGGREGATION_BASE_URL", "http://127.0.0.1:9999/");
        std::env::set_var("ISBANK_CACHE_TTL_SECONDS", "42");
        std::env::set_var("ISBANK_HTTP_TIMEOUT_SECONDS", "5");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.aggregation.environment, AggregationEnvironment::Production);
        assert_eq!(config.aggregation.client_id, "from-env");
        assert_eq!(config.store.driver, StoreDriver::Sqlite);
        assert_eq!(config.store.database_id, "db-env");
        assert_eq!(config.store.user_collection_id, "users-env");
        assert_eq!(config.store.bank_collection_id, "banks-env");
        assert_eq!(config.aggregation.api_base_url(), "http://127.0.0.1:9999");
        assert_eq!(config.cache.ttl_seconds, 42);
        assert_eq!(config.http.timeout_seconds, Some(5));

        clear_env();
    }

    #[test]
    fn test_env_override_invalid_values_ignored() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\nstore:\n  driver: sqlite\n").unwrap();

        std::env::set_var("ISBANK_SERVER_PORT", "not_a_number");
        std::env::set_var("ISBANK_STORE_DRIVER", "postgres");
        std::env::set_var("ISBANK_AGGREGATION_ENVIRONMENT", "staging");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.driver, StoreDriver::Sqlite);
        assert_eq!(config.aggregation.environment, AggregationEnvironment::Sandbox);

        clear_env();
    }
}
