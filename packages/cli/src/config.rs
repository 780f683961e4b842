// ABOUTME: Server configuration loaded from environment variables
// ABOUTME: Bind address, database location, Docker host and analytics settings

use sparkbox_config::constants::{
    POSTHOG_API_KEY, POSTHOG_HOST, SPARKBOX_API_HOST, SPARKBOX_API_PORT,
    SPARKBOX_DATABASE_URL, SPARKBOX_DOCKER_PUBLIC_HOST, SPARKBOX_KILL_ON_SHUTDOWN,
    SPARKBOX_TEMPLATES_PATH,
};
use sparkbox_config::{env_flag, env_string};
use std::net::IpAddr;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 4101;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_POSTHOG_HOST: &str = "https://app.posthog.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(#[from] ParseIntError),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("Invalid bind address: {0}")]
    InvalidHost(String),
    #[error("Could not determine home directory for the default database path")]
    NoHomeDirectory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: String,
    /// Host embedded in preview URLs handed back to callers
    pub public_host: String,
    pub templates_path: Option<PathBuf>,
    /// Kill rather than pause live sessions when the server stops
    pub kill_on_shutdown: bool,
    pub posthog_api_key: Option<String>,
    pub posthog_host: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_str = env_string(SPARKBOX_API_PORT).unwrap_or_else(|| DEFAULT_PORT.to_string());

        let port = port_str.parse::<u16>()?;
        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        let host_str = env_string(SPARKBOX_API_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let host = host_str
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidHost(host_str.clone()))?;

        let database_url = match env_string(SPARKBOX_DATABASE_URL) {
            Some(url) => url,
            None => default_database_url()?,
        };

        Ok(Config {
            host,
            port,
            database_url,
            public_host: env_string(SPARKBOX_DOCKER_PUBLIC_HOST)
                .unwrap_or_else(|| "localhost".to_string()),
            templates_path: env_string(SPARKBOX_TEMPLATES_PATH).map(PathBuf::from),
            kill_on_shutdown: env_flag(SPARKBOX_KILL_ON_SHUTDOWN, false),
            posthog_api_key: posthog_api_key(),
            posthog_host: env_string(POSTHOG_HOST)
                .unwrap_or_else(|| DEFAULT_POSTHOG_HOST.to_string()),
        })
    }

    /// Directory holding the SQLite file when it lives on local disk
    pub fn database_dir(&self) -> Option<PathBuf> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        if path.starts_with(":memory:") {
            return None;
        }
        PathBuf::from(path.split('?').next()?)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
    }
}

fn default_database_url() -> Result<String, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
    let path = home.join(".sparkbox").join("sparkbox.db");
    Ok(format!("sqlite://{}", path.display()))
}

/// Compile-time key first, then the runtime environment
fn posthog_api_key() -> Option<String> {
    option_env!("POSTHOG_API_KEY")
        .map(String::from)
        .or_else(|| env_string(POSTHOG_API_KEY))
        .filter(|key| !key.is_empty())
}
