use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub transport: TransportConfig,
    pub coordinator: CoordinatorConfig,
    pub agent_manager: AgentManagerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub host: String,
    pub port_primary: u16,
    pub port_rpc: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub admission_queue_size: usize,
    #[serde(with = "duration_secs")]
    pub task_timeout_default: Duration,
    #[serde(with = "duration_secs")]
    pub timeout_sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentManagerConfig {
    pub agent_inbox_size: usize,
    #[serde(with = "duration_secs")]
    pub agent_inactive_threshold: Duration,
    #[serde(with = "duration_secs")]
    pub agent_dead_threshold: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub api_key: String,
    pub allowed_origins: Vec<String>,
    pub gateway_send_buffer: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from {:?}", path),
            Err(e) => tracing::debug!("no .env file loaded: {}", e),
        }

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        if !matches!(log_level.as_str(), "debug" | "info" | "warn" | "error") {
            return Err(ConfigError::Invalid {
                field: "LOG_LEVEL".to_string(),
                message: "must be one of debug, info, warn, error".to_string(),
            }
            .into());
        }

        let api_key = env::var("API_KEY")
            .map_err(|_| ConfigError::Missing("API_KEY".to_string()))?;
        if api_key.trim().len() < 32 {
            return Err(ConfigError::Invalid {
                field: "API_KEY".to_string(),
                message: "must be at least 32 characters".to_string(),
            }
            .into());
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let transport = TransportConfig {
            host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port_primary: parse_env_or("TRANSPORT_PORT_PRIMARY", DEFAULT_TRANSPORT_PORT_PRIMARY)?,
            port_rpc: parse_env_or("TRANSPORT_PORT_RPC", DEFAULT_TRANSPORT_PORT_RPC)?,
        };

        let coordinator = CoordinatorConfig {
            admission_queue_size: parse_env_or(
                "ADMISSION_QUEUE_SIZE",
                DEFAULT_ADMISSION_QUEUE_SIZE as u64,
            )? as usize,
            task_timeout_default: parse_duration_env_or(
                "TASK_TIMEOUT_DEFAULT",
                DEFAULT_TASK_TIMEOUT,
            )?,
            timeout_sweep_interval: parse_duration_env_or(
                "TIMEOUT_SWEEP_INTERVAL",
                DEFAULT_TIMEOUT_SWEEP_INTERVAL,
            )?,
        };

        let agent_manager = AgentManagerConfig {
            agent_inbox_size: parse_env_or("AGENT_INBOX_SIZE", DEFAULT_AGENT_INBOX_SIZE as u64)?
                as usize,
            agent_inactive_threshold: parse_duration_env_or(
                "AGENT_INACTIVE_THRESHOLD",
                DEFAULT_AGENT_INACTIVE_THRESHOLD,
            )?,
            agent_dead_threshold: parse_duration_env_or(
                "AGENT_DEAD_THRESHOLD",
                DEFAULT_AGENT_DEAD_THRESHOLD,
            )?,
        };

        let api = ApiConfig {
            api_key,
            allowed_origins,
            gateway_send_buffer: parse_env_or(
                "GATEWAY_SEND_BUFFER",
                DEFAULT_GATEWAY_SEND_BUFFER as u64,
            )? as usize,
        };

        Ok(Config {
            log_level,
            transport,
            coordinator,
            agent_manager,
            api,
        })
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            ConfigError::Invalid {
                field: key.to_string(),
                message: format!("could not parse {raw:?}"),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

fn parse_duration_env_or(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| {
                ConfigError::Invalid {
                    field: key.to_string(),
                    message: format!("could not parse {raw:?} as seconds"),
                }
                .into()
            }),
        Err(_) => Ok(default),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests;
