//! # Back Office Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BOXOFFICE_PORT=8080                                                │
//! │     BOXOFFICE_GATEWAY_MODE=http                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     BOXOFFICE_CONFIG=<path>, or                                        │
//! │     ~/.config/backoffice/backoffice.toml (Linux)                       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     mock gateway, ./boxoffice.db, port 8080                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # backoffice.toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "./boxoffice.db"
//!
//! [auth]
//! jwt_secret = "change-me"
//!
//! [settlement]
//! currency = "EUR"
//! poll_interval_ms = 3000
//! refund_grace_window_secs = 900
//! default_terminal_id = "rdr_front_desk"
//!
//! [gateway]
//! mode = "http"  # mock | http
//! base_url = "https://api.sumup.com"
//! api_key = "sk_live_..."
//! merchant_code = "MC0001"
//! webhook_secret = "..."
//!
//! [live]
//! allowed_origins = ["https://boxoffice.example.com"]
//! ping_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use boxoffice_settlement::SettlementOptions;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: PathBuf::from("./boxoffice.db"),
            max_connections: 5,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_lifetime_secs: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            // Development only; production sets BOXOFFICE_JWT_SECRET
            jwt_secret: "boxoffice-dev-secret-change-in-production".to_string(),
            token_lifetime_secs: 12 * 3600,
        }
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementSettings {
    pub decimal_places: u32,
    pub currency: String,
    pub poll_interval_ms: u64,
    pub refund_grace_window_secs: i64,
    pub pending_timeout_secs: Option<i64>,
    pub default_terminal_id: Option<String>,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        let defaults = SettlementOptions::default();
        SettlementSettings {
            decimal_places: defaults.decimal_places,
            currency: defaults.currency,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            refund_grace_window_secs: defaults.refund_grace_window.num_seconds(),
            pending_timeout_secs: None,
            default_terminal_id: None,
        }
    }
}

impl SettlementSettings {
    pub fn to_options(&self) -> SettlementOptions {
        SettlementOptions {
            decimal_places: self.decimal_places,
            currency: self.currency.clone(),
            refund_grace_window: chrono::Duration::seconds(self.refund_grace_window_secs),
            default_terminal_id: self.default_terminal_id.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            pending_timeout: self.pending_timeout_secs.map(chrono::Duration::seconds),
        }
    }
}

/// Which [`PaymentGateway`](boxoffice_settlement::PaymentGateway) to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// In-process scripted gateway, charges settle by themselves.
    Mock,
    /// Real REST gateway.
    Http,
}

impl FromStr for GatewayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(GatewayMode::Mock),
            "http" => Ok(GatewayMode::Http),
            _ => Err(ConfigError::InvalidValue {
                key: "gateway.mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub mode: GatewayMode,
    pub base_url: String,
    pub api_key: String,
    pub merchant_code: String,
    pub timeout_secs: u64,
    /// Shared secret expected in `x-gateway-secret` on gateway events.
    /// Events are refused while unset.
    pub webhook_secret: Option<String>,
    /// Mock mode: queries before an unscripted charge succeeds.
    pub mock_settle_after: u32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            mode: GatewayMode::Mock,
            base_url: "https://api.sumup.com".to_string(),
            api_key: String::new(),
            merchant_code: String::new(),
            timeout_secs: 10,
            webhook_secret: None,
            mock_settle_after: 3,
        }
    }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("mode", &self.mode)
            .field("base_url", &self.base_url)
            .field("merchant_code", &self.merchant_code)
            .field("timeout_secs", &self.timeout_secs)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Exact `Origin` values allowed to open a live connection.
    pub allowed_origins: Vec<String>,
    pub ping_interval_secs: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            ping_interval_secs: 30,
        }
    }
}

impl LiveSettings {
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}

// =============================================================================
// App Config
// =============================================================================

/// Complete back office configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub settlement: SettlementSettings,
    pub gateway: GatewaySettings,
    pub live: LiveSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else the platform default)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = match config_path.or_else(Self::default_config_path) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        info!(?path, "Loading config from file");
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Platform config directory, e.g. `~/.config/backoffice/backoffice.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "boxoffice", "backoffice")
            .map(|dirs| dirs.config_dir().join("backoffice.toml"))
    }

    /// Applies `BOXOFFICE_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(v) = lookup("BOXOFFICE_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("BOXOFFICE_PORT") {
            self.server.port = parse_value("BOXOFFICE_PORT", &v)?;
        }
        if let Some(v) = lookup("BOXOFFICE_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("BOXOFFICE_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = lookup("BOXOFFICE_POLL_INTERVAL_MS") {
            self.settlement.poll_interval_ms = parse_value("BOXOFFICE_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("BOXOFFICE_PENDING_TIMEOUT_SECS") {
            self.settlement.pending_timeout_secs =
                Some(parse_value("BOXOFFICE_PENDING_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = lookup("BOXOFFICE_DEFAULT_TERMINAL_ID") {
            self.settlement.default_terminal_id = Some(v);
        }
        if let Some(v) = lookup("BOXOFFICE_GATEWAY_MODE") {
            self.gateway.mode = v.parse()?;
        }
        if let Some(v) = lookup("BOXOFFICE_GATEWAY_BASE_URL") {
            self.gateway.base_url = v;
        }
        if let Some(v) = lookup("BOXOFFICE_GATEWAY_API_KEY") {
            self.gateway.api_key = v;
        }
        if let Some(v) = lookup("BOXOFFICE_GATEWAY_MERCHANT_CODE") {
            self.gateway.merchant_code = v;
        }
        if let Some(v) = lookup("BOXOFFICE_GATEWAY_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(v);
        }
        if let Some(v) = lookup("BOXOFFICE_ALLOWED_ORIGINS") {
            self.live.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret must not be empty".into()));
        }
        if self.settlement.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "settlement.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.settlement.decimal_places > 4 {
            return Err(ConfigError::Invalid(
                "settlement.decimal_places must be at most 4".into(),
            ));
        }
        if self.settlement.refund_grace_window_secs < 0 {
            return Err(ConfigError::Invalid(
                "settlement.refund_grace_window_secs must not be negative".into(),
            ));
        }
        if self.settlement.pending_timeout_secs.is_some_and(|t| t <= 0) {
            return Err(ConfigError::Invalid(
                "settlement.pending_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.live.ping_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "live.ping_interval_secs must be greater than 0".into(),
            ));
        }

        if self.gateway.mode == GatewayMode::Http {
            self.gateway_base_url()?;
            if self.gateway.api_key.is_empty() || self.gateway.merchant_code.is_empty() {
                return Err(ConfigError::Invalid(
                    "gateway.api_key and gateway.merchant_code are required in http mode".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn gateway_base_url(&self) -> ConfigResult<Url> {
        Url::parse(&self.gateway.base_url).map_err(|_| ConfigError::InvalidValue {
            key: "gateway.base_url".to_string(),
            value: self.gateway.base_url.clone(),
        })
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.gateway.mode, GatewayMode::Mock);
        assert_eq!(config.settlement.poll_interval_ms, 3000);
        assert_eq!(config.settlement.refund_grace_window_secs, 900);
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [gateway]
            mode = "http"
            api_key = "sk"
            merchant_code = "MC1"

            [live]
            allowed_origins = ["https://box.example"]
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.gateway.mode, GatewayMode::Http);
        assert_eq!(config.gateway.timeout_secs, 10);
        assert!(config.live.allows_origin("https://box.example"));
        assert!(!config.live.allows_origin("http://localhost:3000"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BOXOFFICE_PORT", "9090"),
            ("BOXOFFICE_GATEWAY_MODE", "HTTP"),
            ("BOXOFFICE_PENDING_TIMEOUT_SECS", "600"),
            ("BOXOFFICE_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.gateway.mode, GatewayMode::Http);
        assert_eq!(
            config.settlement.to_options().pending_timeout,
            Some(chrono::Duration::minutes(10))
        );
        assert_eq!(config.live.allowed_origins.len(), 2);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "BOXOFFICE_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "BOXOFFICE_PORT"));
    }

    #[test]
    fn test_http_mode_requires_credentials() {
        let mut config = AppConfig::default();
        config.gateway.mode = GatewayMode::Http;
        assert!(config.validate().is_err());

        config.gateway.api_key = "sk".into();
        config.gateway.merchant_code = "MC".into();
        config.gateway.base_url = "not a url".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_secrets_are_not_logged() {
        let mut config = AppConfig::default();
        config.gateway.webhook_secret = Some("hook-secret".into());
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hook-secret"));
        assert!(!printed.contains("boxoffice-dev-secret"));
    }
}
