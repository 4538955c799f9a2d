//! Volume Admin Configuration Module
//!
//! Loading, validation and defaulting of the service configuration from
//! a YAML file, `VOLUME_ADMIN__`-prefixed environment variables, and
//! command-line overrides. The liveness threshold and the local host
//! identity are explicit configuration carried by [`LifecycleConfig`],
//! never process-wide state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::models::{Binary, LogLevel};
use crate::{DEFAULT_PORT, DEFAULT_SERVICE_DOWN_TIME};

/// Main volume admin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAdminConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Lifecycle controller configuration
    pub lifecycle: LifecycleConfig,

    /// Backend RPC configuration
    pub rpc: RpcConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Shutdown timeout in seconds
    pub shutdown_timeout: u64,

    /// Request timeout in seconds
    pub request_timeout: u64,
}

impl ServerConfig {
    /// Get the server socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("Invalid server address")
    }

    /// Get request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Lifecycle controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Host identity of this API process, matched by log-level requests
    /// targeting the API binary.
    pub local_host: String,

    /// Seconds since the last heartbeat before a service reports `down`.
    pub service_down_time_secs: u64,

    /// Expose the extended service fields (`disabled_reason`,
    /// `replication_status`, `active_backend_id`, `frozen`) and accept
    /// the disable-log-reason action.
    pub extended_services: bool,
}

impl LifecycleConfig {
    /// The down-time threshold as a chrono duration.
    pub fn down_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.service_down_time_secs as i64)
    }
}

/// Backend RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Base URL per backend binary, keyed by wire name
    /// (e.g. `storcore-volume: "http://volume-host:8777"`).
    pub endpoints: HashMap<String, String>,

    /// Transport timeout in seconds. A timed-out RPC is surfaced, never
    /// retried here.
    pub timeout_secs: u64,
}

impl RpcConfig {
    /// Transport timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Log format (json or pretty)
    pub format: String,
}

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "volume-admin-server",
    about = "StorCore Volume Service Administration API",
    version
)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/volume-admin.yaml")]
    pub config: PathBuf,

    /// Server port (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Enable debug mode
    #[arg(long)]
    pub debug: bool,
}

impl VolumeAdminConfig {
    /// Load configuration from defaults, file and environment variables.
    pub fn load(args: &Args) -> Result<Self> {
        let defaults = config::Config::try_from(&VolumeAdminConfig::default())
            .context("Failed to build default configuration")?;

        let mut settings = config::Config::builder().add_source(defaults);

        if args.config.exists() {
            settings = settings.add_source(config::File::from(args.config.clone()).required(false));
        }

        settings =
            settings.add_source(config::Environment::with_prefix("VOLUME_ADMIN").separator("__"));

        let mut config: VolumeAdminConfig = settings
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Apply command-line overrides
        if let Some(port) = args.port {
            config.server.port = port;
        }

        if let Some(ref log_level) = args.log_level {
            config.logging.level = log_level.clone();
        }

        if args.debug {
            config.logging.level = "debug".to_string();
        }

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Validate configuration settings.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.lifecycle.local_host.is_empty() {
            return Err(anyhow::anyhow!("lifecycle.local_host is required"));
        }

        if self.lifecycle.service_down_time_secs == 0 {
            return Err(anyhow::anyhow!(
                "lifecycle.service_down_time_secs must be at least 1"
            ));
        }

        if self.rpc.timeout_secs == 0 {
            return Err(anyhow::anyhow!("rpc.timeout_secs must be at least 1"));
        }

        for key in self.rpc.endpoints.keys() {
            Binary::from_str(key).map_err(|_| {
                anyhow::anyhow!("rpc.endpoints key {key:?} is not a known binary name")
            })?;
        }

        if LogLevel::from_str(&self.logging.level).is_err()
            && self.logging.level.to_lowercase() != "trace"
        {
            return Err(anyhow::anyhow!(
                "logging.level {:?} is not a recognized level",
                self.logging.level
            ));
        }

        Ok(())
    }
}

impl Default for VolumeAdminConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                shutdown_timeout: 30,
                request_timeout: 60,
            },
            lifecycle: LifecycleConfig {
                local_host: "volume-admin".to_string(),
                service_down_time_secs: DEFAULT_SERVICE_DOWN_TIME,
                extended_services: true,
            },
            rpc: RpcConfig {
                endpoints: HashMap::new(),
                timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VolumeAdminConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_down_time() {
        let mut config = VolumeAdminConfig::default();
        config.lifecycle.service_down_time_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_rpc_endpoint_key() {
        let mut config = VolumeAdminConfig::default();
        config
            .rpc
            .endpoints
            .insert("storcore-frobnicator".to_string(), "http://x".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn down_threshold_matches_seconds() {
        let config = VolumeAdminConfig::default();
        assert_eq!(
            config.lifecycle.down_threshold(),
            chrono::Duration::seconds(DEFAULT_SERVICE_DOWN_TIME as i64)
        );
    }
}
