//! Configuration management for mediagrid.
use std::{env, fs, path::Path, time::Duration};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{
    DEFAULT_DISPATCH_INTERVAL_MS, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_JOB_LIFETIME_DAYS,
    DEFAULT_MAX_ATTEMPTS, MIN_DISPATCH_INTERVAL_MS,
};
use crate::error::ConfigError;

/// A configuration scalar that tolerates malformed input.
///
/// Anything that fails to parse as `T` is kept as the raw YAML value and
/// resolved to the built-in default with a warning, so a typo in one key
/// never takes the node down.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Lenient<T> {
    /// A well-formed value.
    Value(T),
    /// Anything else found under the key.
    Malformed(serde_yaml::Value),
}

impl<T: Clone> Lenient<T> {
    fn resolve(&self, key: &str) -> Option<T> {
        match self {
            Lenient::Value(value) => Some(value.clone()),
            Lenient::Malformed(raw) => {
                warn!("Ignoring malformed value for '{key}' ({raw:?}); using the default");
                None
            }
        }
    }
}

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Configuration version.
    pub version: String,
    /// Base URL this node is reachable at.
    pub server_url: Option<String>,
    /// IP address announced with the host registration.
    pub address: Option<String>,
    /// Delay between dispatch rounds in milliseconds. `0` disables the
    /// dispatcher on this node.
    #[serde(default)]
    pub dispatch_interval_ms: Option<Lenient<u64>>,
    /// Delay between heartbeat rounds in seconds. `0` disables the monitor.
    #[serde(default)]
    pub heartbeat_interval_secs: Option<Lenient<i64>>,
    /// Failures before a WARNING service transitions to ERROR.
    #[serde(default)]
    pub max_attempts: Option<Lenient<u32>>,
    /// Whether to collect per-operation job statistics.
    #[serde(default)]
    pub collect_job_stats: Option<Lenient<bool>>,
    /// Age in days beyond which finished parentless jobs are pruned.
    #[serde(default)]
    pub job_lifetime_days: Option<Lenient<u64>>,
    /// Load budget announced for this host; defaults to the core count.
    #[serde(default)]
    pub max_load: Option<Lenient<f32>>,
    /// Identity attached to jobs created without an explicit one.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Services published by this node, registered at startup.
    #[serde(default)]
    pub services: Vec<ServicePublication>,
}

/// Default organization and user for locally created jobs.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentityConfig {
    /// Organization id.
    pub organization: String,
    /// User name.
    pub user: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            organization: "default".into(),
            user: "system".into(),
        }
    }
}

/// A service this node publishes and wants registered at startup.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServicePublication {
    /// Job type the service executes.
    pub job_type: String,
    /// Endpoint path relative to the node's base URL.
    pub path: String,
    /// Whether the service owns execution of its job type.
    #[serde(default = "default_true")]
    pub job_producer: bool,
}

fn default_true() -> bool {
    true
}

/// Resolved runtime settings after defaulting and clamping.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySettings {
    /// Base URL this node is reachable at.
    pub server_url: String,
    /// IP address announced with the host registration.
    pub address: String,
    /// Dispatch round delay; `None` disables the dispatcher.
    pub dispatch_interval: Option<Duration>,
    /// Heartbeat round delay; `None` disables the monitor.
    pub heartbeat_interval: Option<Duration>,
    /// Failures before a WARNING service transitions to ERROR.
    pub max_attempts: u32,
    /// Whether to collect per-operation job statistics.
    pub collect_job_stats: bool,
    /// Age in days beyond which finished parentless jobs are pruned.
    pub job_lifetime_days: u64,
    /// Load budget for this host; `None` means "use the core count".
    pub max_load: Option<f32>,
    /// Identity attached to locally created jobs.
    pub identity: IdentityConfig,
    /// Services registered at startup.
    pub services: Vec<ServicePublication>,
}

impl Config {
    /// Converts the configuration into runtime settings, applying defaults
    /// and clamping out-of-range values with a warning.
    pub fn to_settings(&self) -> RegistrySettings {
        let dispatch_ms = self
            .dispatch_interval_ms
            .as_ref()
            .and_then(|value| value.resolve("dispatch_interval_ms"))
            .unwrap_or(DEFAULT_DISPATCH_INTERVAL_MS);
        let dispatch_interval = match dispatch_ms {
            0 => {
                info!("Job dispatching is disabled on this node");
                None
            }
            ms if ms < MIN_DISPATCH_INTERVAL_MS => {
                warn!(
                    "dispatch_interval_ms {ms} ms is below the minimum; clamping to {} ms",
                    MIN_DISPATCH_INTERVAL_MS
                );
                Some(Duration::from_millis(MIN_DISPATCH_INTERVAL_MS))
            }
            ms => Some(Duration::from_millis(ms)),
        };

        let heartbeat_secs = self
            .heartbeat_interval_secs
            .as_ref()
            .and_then(|value| value.resolve("heartbeat_interval_secs"))
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS as i64);
        let heartbeat_interval = match heartbeat_secs {
            0 => {
                info!("Service heartbeat is disabled on this node");
                None
            }
            secs if secs < 0 => {
                warn!(
                    "heartbeat_interval_secs {secs} is negative; using the default of {} s",
                    DEFAULT_HEARTBEAT_INTERVAL_SECS
                );
                Some(Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS))
            }
            secs => Some(Duration::from_secs(secs as u64)),
        };

        let max_load = self
            .max_load
            .as_ref()
            .and_then(|value| value.resolve("max_load"))
            .filter(|load| {
                if load.is_finite() && *load > 0.0 {
                    true
                } else {
                    warn!("max_load {load} is not a positive number; using the core count");
                    false
                }
            });

        RegistrySettings {
            server_url: self
                .server_url
                .clone()
                .unwrap_or_else(|| "http://localhost:8080".into()),
            address: self.address.clone().unwrap_or_else(|| "127.0.0.1".into()),
            dispatch_interval,
            heartbeat_interval,
            max_attempts: self
                .max_attempts
                .as_ref()
                .and_then(|value| value.resolve("max_attempts"))
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            collect_job_stats: self
                .collect_job_stats
                .as_ref()
                .and_then(|value| value.resolve("collect_job_stats"))
                .unwrap_or(true),
            job_lifetime_days: self
                .job_lifetime_days
                .as_ref()
                .and_then(|value| value.resolve("job_lifetime_days"))
                .unwrap_or(DEFAULT_JOB_LIFETIME_DAYS),
            max_load,
            identity: self.identity.clone(),
            services: self.services.clone(),
        }
    }
}

/// Expands environment variables within a string.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").unwrap();
    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                if missing.is_none() {
                    missing = Some(var_name.to_string());
                }
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::MissingEnvVar(name)),
        None => Ok(result.to_string()),
    }
}

/// Loads and parses the configuration file, expanding environment variables.
pub fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let config_path = config_path.map(Path::new).unwrap_or_else(|| Path::new("mediagrid.yaml"));

    let content = fs::read_to_string(config_path).map_err(|e| {
        ConfigError::Read(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let expanded = expand_env_vars(&content)?;
    let config: Config = serde_yaml::from_str(&expanded)?;
    Ok(config)
}
