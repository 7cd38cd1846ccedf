//! Configuration loader and validator for the farm backend.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    pub server: Server,
    pub auth: Auth,
    pub weather: Weather,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Bearer token settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Auth {
    /// When false, mutating routes accept guests.
    pub enabled: bool,
    pub secret: String,
    pub token_ttl_minutes: i64,
}

/// Upstream weather/geocoding API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Weather {
    pub forecast_url: String,
    pub geocoding_url: String,
    pub timeout_ms: u64,
    pub default_latitude: f64,
    pub default_longitude: f64,
}

impl App {
    /// `data_dir` with a leading `~/` expanded against `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Store URL: `DATABASE_URL` wins, otherwise a file under `data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/herdbook.db", self.app.resolved_data_dir()))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.server.bind.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::Invalid("server.bind must be a socket address"));
    }

    if cfg.auth.secret.trim().is_empty() {
        return Err(ConfigError::Invalid("auth.secret must be non-empty"));
    }
    if cfg.auth.token_ttl_minutes <= 0 {
        return Err(ConfigError::Invalid("auth.token_ttl_minutes must be > 0"));
    }

    if cfg.weather.forecast_url.trim().is_empty() {
        return Err(ConfigError::Invalid("weather.forecast_url must be non-empty"));
    }
    if cfg.weather.geocoding_url.trim().is_empty() {
        return Err(ConfigError::Invalid("weather.geocoding_url must be non-empty"));
    }
    if cfg.weather.timeout_ms == 0 {
        return Err(ConfigError::Invalid("weather.timeout_ms must be > 0"));
    }
    if !(-90.0..=90.0).contains(&cfg.weather.default_latitude) {
        return Err(ConfigError::Invalid("weather.default_latitude out of range"));
    }
    if !(-180.0..=180.0).contains(&cfg.weather.default_longitude) {
        return Err(ConfigError::Invalid("weather.default_longitude out of range"));
    }

    Ok(())
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

server:
  bind: "0.0.0.0:3000"
  cors_origins:
    - "http://localhost:3000"

auth:
  enabled: false
  secret: "CHANGE_ME"
  token_ttl_minutes: 60

weather:
  forecast_url: "https://api.open-meteo.com/v1/forecast"
  geocoding_url: "https://geocoding-api.open-meteo.com/v1/search"
  timeout_ms: 5000
  default_latitude: -32.2968
  default_longitude: 26.4194
"#
}
