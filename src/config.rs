use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::hardware::DeviceSource;

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub device: DeviceConfig,
    #[validate(nested)]
    pub scheduler: SchedulerConfig,
    #[validate(nested)]
    pub energy: EnergyConfig,
    #[validate(nested)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DeviceConfig {
    pub source: DeviceSource,
    /// Gateway host or `host:port`
    pub host: String,
    pub username: String,
    pub password: String,
    /// Upper bound for one fetch round trip
    #[validate(range(min = 1, max = 9))]
    pub fetch_timeout_secs: u64,
    /// How often the daily energy history is refreshed
    #[validate(range(min = 1))]
    pub history_interval_secs: u64,
    /// How often the installation layout and system info are refreshed
    #[validate(range(min = 1))]
    pub info_interval_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            source: DeviceSource::default(),
            host: "192.168.1.50".to_string(),
            username: "Tigo".to_string(),
            password: "$olar".to_string(),
            fetch_timeout_secs: 8,
            history_interval_secs: 600,
            info_interval_secs: 3600,
        }
    }
}

impl DeviceConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn history_interval(&self) -> Duration {
        Duration::from_secs(self.history_interval_secs)
    }

    pub fn info_interval(&self) -> Duration {
        Duration::from_secs(self.info_interval_secs)
    }
}

/// Polling and retry timing, fixed for the lifetime of the process
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SchedulerConfig {
    #[validate(range(min = 1))]
    pub poll_interval_secs: u64,
    #[validate(range(min = 1, max = 100))]
    pub startup_max_attempts: u32,
    #[validate(range(min = 1))]
    pub startup_base_delay_secs: u64,
    #[validate(range(min = 1))]
    pub startup_max_delay_secs: u64,
    /// Retries after a failed steady-state fetch (0 disables retrying)
    #[validate(range(max = 100))]
    pub steady_retry_attempts: u32,
    #[validate(range(min = 1))]
    pub steady_base_delay_secs: u64,
    #[validate(range(min = 1))]
    pub steady_max_delay_secs: u64,
    /// At most one failure per window is logged at warn level
    #[validate(range(min = 1))]
    pub failure_log_window_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            startup_max_attempts: 6,
            startup_base_delay_secs: 10,
            startup_max_delay_secs: 60,
            steady_retry_attempts: 4,
            steady_base_delay_secs: 15,
            steady_max_delay_secs: 60,
            failure_log_window_secs: 900,
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn failure_log_window(&self) -> Duration {
        Duration::from_secs(self.failure_log_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct EnergyConfig {
    /// IANA zone the day and month boundaries are evaluated in
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: String,
    pub state_file: PathBuf,
    #[validate(range(min = 1))]
    pub persist_interval_secs: u64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            state_file: PathBuf::from("data/energy_state.json"),
            persist_interval_secs: 300,
        }
    }
}

impl EnergyConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {e}", self.timezone))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event, for log shippers
    #[default]
    Json,
    /// Single-line human readable output
    Compact,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set
    #[validate(length(min = 1))]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: "info,hyper=warn,reqwest=warn,tower_http=info".to_string(),
        }
    }
}

fn validate_timezone(tz: &str) -> Result<(), ValidationError> {
    tz.parse::<Tz>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("unknown_timezone"))
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("PEM__").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("failed to read configuration")?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}
