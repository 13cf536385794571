use std::time::Duration;

use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub security: SecuritySettings,
    pub email: EmailSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Take the client origin from `X-Forwarded-For`/`Forwarded` (only behind a trusted proxy)
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token signing and session settings
#[derive(serde::Deserialize, Clone)]
pub struct SecuritySettings {
    /// Shared secret for token signatures and credential hashes
    pub secret: String,
    pub issuer: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    #[serde(default = "default_max_session_attempts")]
    pub max_session_attempts: u32,
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
    /// How often sessions older than `refresh_token_expiry` are deleted
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,
}

impl SecuritySettings {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailSettings {
    pub base_url: String,
    pub sender: String,
    #[serde(default = "default_email_timeout_ms")]
    pub timeout_ms: u64,
}

impl EmailSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_session_attempts() -> u32 {
    5
}

fn default_notify_timeout_ms() -> u64 {
    5_000
}

fn default_session_sweep_interval_secs() -> u64 {
    3_600
}

fn default_email_timeout_ms() -> u64 {
    10_000
}

impl Settings {
    /// Reject settings the token core cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let security = &self.security;

        if security.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("security.secret".to_string()));
        }
        if security.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "security.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if security.session_sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "security.session_sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if security.max_session_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "security.max_session_attempts must be at least 1".to_string(),
            ));
        }
        if security.access_token_expiry <= 0 || security.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiries must be positive".to_string(),
            ));
        }
        if security.refresh_token_expiry < security.access_token_expiry {
            return Err(ConfigError::InvalidValue(
                "security.refresh_token_expiry must not be shorter than access_token_expiry"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Load `configuration.yaml` (optional) overlaid with `APP_*` environment
/// variables, e.g. `APP_SECURITY__SECRET`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
