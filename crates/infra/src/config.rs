//! Layered application configuration.
//!
//! Sources, later wins: `config/einvoice.toml` (optional), then `EINVOICE__*`
//! environment variables, e.g. `EINVOICE__DATABASE__URL`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::Deserialize;

pub use ::config::ConfigError;

use crate::authority::{AuthorityEndpoints, ServiceEndpoints};

pub const DEFAULT_CONFIG_FILE: &str = "config/einvoice.toml";
pub const ENV_PREFIX: &str = "EINVOICE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub authority: AuthorityConfig,
    pub issuance: IssuanceSettings,
    pub reconciler: ReconcilerConfig,
    pub finalizer: FinalizerConfig,
    pub signer: SignerConfig,
    pub mail: MailConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(Some(Path::new(DEFAULT_CONFIG_FILE)), env_source())
    }

    /// Loads an explicit file (which must exist) plus the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Self::build(Some(path), env_source())
    }

    fn build(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder.add_source(env).build()?.try_deserialize()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL. Without one the service runs on in-memory stores.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    pub test: ServiceEndpoints,
    pub production: ServiceEndpoints,
    pub request_timeout_secs: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        let endpoints = AuthorityEndpoints::default();
        Self {
            test: endpoints.test,
            production: endpoints.production,
            request_timeout_secs: 30,
        }
    }
}

impl AuthorityConfig {
    pub fn endpoints(&self) -> AuthorityEndpoints {
        AuthorityEndpoints {
            test: self.test.clone(),
            production: self.production.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IssuanceSettings {
    /// Upper bound for each signer or authority call.
    pub call_timeout_secs: u64,
    /// Pause between reception and the first authorization poll.
    pub authorization_delay_ms: u64,
    /// After this long in `EN_PROCESO` a transaction gets a fresh access key.
    pub stuck_after_minutes: i64,
}

impl Default for IssuanceSettings {
    fn default() -> Self {
        Self {
            call_timeout_secs: 60,
            authorization_delay_ms: 3_000,
            stuck_after_minutes: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Only sweep receipts created within this many hours. Unset sweeps all.
    pub window_hours: Option<i64>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            window_hours: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FinalizerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub output_dir: PathBuf,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            output_dir: PathBuf::from("var/receipts"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("einvoice-signer"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub endpoint: String,
    /// Mail is disabled while this is unset.
    pub api_key: Option<String>,
    pub sender: String,
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.resend.com".into(),
            api_key: None,
            sender: "facturacion@localhost".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormatSetting,
}
