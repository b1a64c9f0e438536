//! Configuration module for the telemetry agent.
//!
//! Settings are fixed when the firmware is built: every value is read with
//! `option_env!` at compile time and validated once at startup. There is no
//! runtime environment or command-line surface.

use std::time::Duration;

/// Default ingestion host
const DEFAULT_SERVER_HOST: &str = "api.tago.io";

/// Default ingestion port
const DEFAULT_SERVER_PORT: u16 = 80;

/// Default ingestion path
const DEFAULT_SERVER_PATH: &str = "/data";

/// Default interval between full telemetry cycles, in seconds
const DEFAULT_PUSH_INTERVAL_SECS: u64 = 10;

/// Default pause between the two pushes of one cycle, in seconds
const DEFAULT_INTER_PUSH_DELAY_SECS: u64 = 1;

/// Default TCP connect timeout, in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP exchange timeout, in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default payload buffer capacity, in bytes
const DEFAULT_PAYLOAD_CAPACITY: usize = 1280;

const MIN_PUSH_INTERVAL_SECS: u64 = 1;
const MAX_PUSH_INTERVAL_SECS: u64 = 3600;
const MAX_INTER_PUSH_DELAY_SECS: u64 = 60;
const MIN_PAYLOAD_CAPACITY: usize = 64;
const MAX_PAYLOAD_CAPACITY: usize = 4096;

/// Configuration for the telemetry agent.
///
/// Recognized build-time variables:
/// - `TELEMETRY_SERVER_HOST`: ingestion host (default: api.tago.io)
/// - `TELEMETRY_SERVER_PORT`: ingestion port (default: 80)
/// - `TELEMETRY_SERVER_PATH`: ingestion path (default: /data)
/// - `TELEMETRY_DEVICE_TOKEN`: optional `Device-Token` header value
/// - `TELEMETRY_PUSH_INTERVAL_SECS`: seconds between cycles (default: 10)
/// - `TELEMETRY_INTER_PUSH_DELAY_SECS`: seconds between the two pushes (default: 1)
/// - `TELEMETRY_CONNECT_TIMEOUT_SECS`: TCP connect timeout (default: 10)
/// - `TELEMETRY_REQUEST_TIMEOUT_SECS`: HTTP exchange timeout (default: 30)
/// - `TELEMETRY_PAYLOAD_CAPACITY`: payload buffer size in bytes (default: 1280)
#[derive(Debug, Clone)]
pub struct Config {
    /// Host name of the ingestion endpoint
    pub server_host: String,

    /// TCP port of the ingestion endpoint
    pub server_port: u16,

    /// Request path of the ingestion endpoint, always starting with `/`
    pub server_path: String,

    /// Static device token sent with every push
    pub device_token: Option<String>,

    /// Sleep between the end of one cycle and the start of the next
    pub push_interval: Duration,

    /// Sleep between the temperature push and the luminosity collection
    pub inter_push_delay: Duration,

    /// Upper bound for dialing the endpoint
    pub connect_timeout: Duration,

    /// Upper bound for one HTTP exchange
    pub request_timeout: Duration,

    /// Capacity of the payload buffer in bytes
    pub payload_capacity: usize,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub var: Option<String>,
}

impl ConfigError {
    fn for_var(var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            var: Some(var.to_string()),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Values baked into the binary at compile time.
fn build_time_var(key: &str) -> Option<String> {
    let value = match key {
        "TELEMETRY_SERVER_HOST" => option_env!("TELEMETRY_SERVER_HOST"),
        "TELEMETRY_SERVER_PORT" => option_env!("TELEMETRY_SERVER_PORT"),
        "TELEMETRY_SERVER_PATH" => option_env!("TELEMETRY_SERVER_PATH"),
        "TELEMETRY_DEVICE_TOKEN" => option_env!("TELEMETRY_DEVICE_TOKEN"),
        "TELEMETRY_PUSH_INTERVAL_SECS" => option_env!("TELEMETRY_PUSH_INTERVAL_SECS"),
        "TELEMETRY_INTER_PUSH_DELAY_SECS" => option_env!("TELEMETRY_INTER_PUSH_DELAY_SECS"),
        "TELEMETRY_CONNECT_TIMEOUT_SECS" => option_env!("TELEMETRY_CONNECT_TIMEOUT_SECS"),
        "TELEMETRY_REQUEST_TIMEOUT_SECS" => option_env!("TELEMETRY_REQUEST_TIMEOUT_SECS"),
        "TELEMETRY_PAYLOAD_CAPACITY" => option_env!("TELEMETRY_PAYLOAD_CAPACITY"),
        _ => None,
    };
    value.map(str::to_string)
}

impl Config {
    /// Load the configuration that was fixed when the binary was built.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a baked-in value fails validation.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::from_lookup(build_time_var)
    }

    /// Parse a configuration from an arbitrary key lookup.
    ///
    /// Missing keys fall back to defaults; present keys are validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let server_host = match get("TELEMETRY_SERVER_HOST") {
            Some(host) if host.is_empty() => {
                return Err(ConfigError::for_var(
                    "TELEMETRY_SERVER_HOST",
                    "host must not be empty",
                ))
            }
            Some(host) => host,
            None => DEFAULT_SERVER_HOST.to_string(),
        };

        let server_port = match get("TELEMETRY_SERVER_PORT") {
            Some(value) => {
                let port: u16 = value.parse().map_err(|_| {
                    ConfigError::for_var(
                        "TELEMETRY_SERVER_PORT",
                        format!("'{}' is not a valid port", value),
                    )
                })?;
                if port == 0 {
                    return Err(ConfigError::for_var(
                        "TELEMETRY_SERVER_PORT",
                        "port must be greater than 0",
                    ));
                }
                port
            }
            None => DEFAULT_SERVER_PORT,
        };

        let server_path = match get("TELEMETRY_SERVER_PATH") {
            Some(path) if path.starts_with('/') => path,
            Some(path) => format!("/{}", path),
            None => DEFAULT_SERVER_PATH.to_string(),
        };

        let device_token = get("TELEMETRY_DEVICE_TOKEN").filter(|t| !t.is_empty());

        let push_interval = parse_secs(
            get("TELEMETRY_PUSH_INTERVAL_SECS"),
            "TELEMETRY_PUSH_INTERVAL_SECS",
            DEFAULT_PUSH_INTERVAL_SECS,
            MIN_PUSH_INTERVAL_SECS,
            MAX_PUSH_INTERVAL_SECS,
        )?;

        let inter_push_delay = parse_secs(
            get("TELEMETRY_INTER_PUSH_DELAY_SECS"),
            "TELEMETRY_INTER_PUSH_DELAY_SECS",
            DEFAULT_INTER_PUSH_DELAY_SECS,
            0,
            MAX_INTER_PUSH_DELAY_SECS,
        )?;

        let connect_timeout = parse_secs(
            get("TELEMETRY_CONNECT_TIMEOUT_SECS"),
            "TELEMETRY_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
            1,
            u64::MAX,
        )?;

        let request_timeout = parse_secs(
            get("TELEMETRY_REQUEST_TIMEOUT_SECS"),
            "TELEMETRY_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
            1,
            u64::MAX,
        )?;

        let payload_capacity = match get("TELEMETRY_PAYLOAD_CAPACITY") {
            Some(value) => {
                let capacity: usize = value.parse().map_err(|_| {
                    ConfigError::for_var(
                        "TELEMETRY_PAYLOAD_CAPACITY",
                        format!("'{}' is not a valid number", value),
                    )
                })?;
                if !(MIN_PAYLOAD_CAPACITY..=MAX_PAYLOAD_CAPACITY).contains(&capacity) {
                    return Err(ConfigError::for_var(
                        "TELEMETRY_PAYLOAD_CAPACITY",
                        format!(
                            "capacity {} outside allowed range ({}..={})",
                            capacity, MIN_PAYLOAD_CAPACITY, MAX_PAYLOAD_CAPACITY
                        ),
                    ));
                }
                capacity
            }
            None => DEFAULT_PAYLOAD_CAPACITY,
        };

        Ok(Self {
            server_host,
            server_port,
            server_path,
            device_token,
            push_interval,
            inter_push_delay,
            connect_timeout,
            request_timeout,
            payload_capacity,
        })
    }

    /// Full URL of the ingestion endpoint.
    pub fn endpoint_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.server_host,
            self.server_port,
            self.server_path
        )
    }
}

/// Parse a whole number of seconds within `[min, max]`.
fn parse_secs(
    value: Option<String>,
    var: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };

    let secs: u64 = value
        .parse()
        .map_err(|_| ConfigError::for_var(var, format!("'{}' is not a valid number", value)))?;

    if secs < min {
        return Err(ConfigError::for_var(
            var,
            format!("{} is below minimum ({}s)", secs, min),
        ));
    }

    if secs > max {
        return Err(ConfigError::for_var(
            var,
            format!("{} exceeds maximum ({}s)", secs, max),
        ));
    }

    Ok(Duration::from_secs(secs))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: DEFAULT_SERVER_HOST.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            server_path: DEFAULT_SERVER_PATH.to_string(),
            device_token: None,
            push_interval: Duration::from_secs(DEFAULT_PUSH_INTERVAL_SECS),
            inter_push_delay: Duration::from_secs(DEFAULT_INTER_PUSH_DELAY_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            payload_capacity: DEFAULT_PAYLOAD_CAPACITY,
        }
    }
}
