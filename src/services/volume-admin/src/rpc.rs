//! Backend RPC Module
//!
//! The transport used to reach backend service processes for the
//! operations that must run on the backend itself (freeze, thaw,
//! failover, log-level control). The trait is the seam the lifecycle
//! controller mocks in tests; the HTTP implementation talks to the
//! backend's internal control endpoint over reqwest.
//!
//! A timed-out call is reported as [`AdminError::RpcTimeout`] and is
//! never retried here. Any other transport or non-2xx failure becomes
//! [`AdminError::Rpc`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::RpcConfig;
use crate::models::{Binary, LogLevel};
use crate::{AdminError, Result};

/// Calls dispatched to a backend service process.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackendRpc: Send + Sync {
    /// Stop the scheduler from placing new workloads on the host.
    async fn freeze_host(&self, binary: Binary, host: &str) -> Result<()>;

    /// Resume scheduling to the host.
    async fn thaw_host(&self, binary: Binary, host: &str) -> Result<()>;

    /// Fail the host (or its cluster) over to a secondary replication
    /// target.
    async fn failover_host(
        &self,
        binary: Binary,
        host: &str,
        cluster: Option<String>,
        secondary_backend_id: Option<String>,
    ) -> Result<()>;

    /// Set the log level on the backend, optionally scoped to a logger
    /// prefix.
    async fn set_log_levels(
        &self,
        binary: Binary,
        host: &str,
        prefix: Option<String>,
        level: LogLevel,
    ) -> Result<()>;

    /// Read the effective log levels from the backend, optionally scoped
    /// to a logger prefix.
    async fn get_log_levels(
        &self,
        binary: Binary,
        host: &str,
        prefix: Option<String>,
    ) -> Result<HashMap<String, String>>;
}

#[derive(Debug, Serialize)]
struct FailoverCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary_backend_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetLogCall {
    level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogLevelsReply {
    log_levels: HashMap<String, String>,
}

/// Backend RPC over the backends' internal HTTP control endpoints.
///
/// Endpoints are configured per binary; a binary with no configured
/// endpoint cannot be reached and calls to it fail as RPC errors.
pub struct HttpBackendRpc {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl HttpBackendRpc {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AdminError::Internal(format!("failed to build RPC client: {e}")))?;

        Ok(Self {
            client,
            endpoints: config.endpoints.clone(),
        })
    }

    fn control_url(&self, binary: Binary, host: &str, action: &str) -> Result<String> {
        let base = self.endpoints.get(binary.wire_name()).ok_or_else(|| {
            AdminError::Rpc(format!("no RPC endpoint configured for {binary}"))
        })?;
        Ok(format!(
            "{}/internal/v1/hosts/{host}/{action}",
            base.trim_end_matches('/')
        ))
    }

    fn map_transport_error(host: &str, err: reqwest::Error) -> AdminError {
        if err.is_timeout() {
            warn!(host, "backend RPC timed out");
            AdminError::RpcTimeout(host.to_string())
        } else {
            AdminError::Rpc(err.to_string())
        }
    }

    async fn post<B: Serialize + Sync>(
        &self,
        binary: Binary,
        host: &str,
        action: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let url = self.control_url(binary, host, action)?;
        debug!(%binary, host, action, "dispatching backend RPC");

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_transport_error(host, e))?;

        if !response.status().is_success() {
            return Err(AdminError::Rpc(format!(
                "{action} on {host} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl BackendRpc for HttpBackendRpc {
    async fn freeze_host(&self, binary: Binary, host: &str) -> Result<()> {
        self.post::<()>(binary, host, "freeze", None).await?;
        Ok(())
    }

    async fn thaw_host(&self, binary: Binary, host: &str) -> Result<()> {
        self.post::<()>(binary, host, "thaw", None).await?;
        Ok(())
    }

    async fn failover_host(
        &self,
        binary: Binary,
        host: &str,
        cluster: Option<String>,
        secondary_backend_id: Option<String>,
    ) -> Result<()> {
        let call = FailoverCall {
            cluster,
            secondary_backend_id,
        };
        self.post(binary, host, "failover", Some(&call)).await?;
        Ok(())
    }

    async fn set_log_levels(
        &self,
        binary: Binary,
        host: &str,
        prefix: Option<String>,
        level: LogLevel,
    ) -> Result<()> {
        let call = SetLogCall { level, prefix };
        self.post(binary, host, "log-levels", Some(&call)).await?;
        Ok(())
    }

    async fn get_log_levels(
        &self,
        binary: Binary,
        host: &str,
        prefix: Option<String>,
    ) -> Result<HashMap<String, String>> {
        let mut url = self.control_url(binary, host, "log-levels")?;
        if let Some(ref prefix) = prefix {
            url = format!("{url}?prefix={prefix}");
        }
        debug!(%binary, host, "reading backend log levels");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::map_transport_error(host, e))?;

        if !response.status().is_success() {
            return Err(AdminError::Rpc(format!(
                "get-log on {host} returned {}",
                response.status()
            )));
        }

        let reply: LogLevelsReply = response
            .json()
            .await
            .map_err(|e| AdminError::Rpc(format!("malformed log-levels reply: {e}")))?;
        Ok(reply.log_levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_with_endpoint() -> HttpBackendRpc {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            Binary::Volume.wire_name().to_string(),
            "http://volume-host:8777/".to_string(),
        );
        HttpBackendRpc::new(&RpcConfig {
            endpoints,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn control_url_strips_trailing_slash() {
        let rpc = rpc_with_endpoint();
        let url = rpc
            .control_url(Binary::Volume, "host1@lvm", "freeze")
            .unwrap();
        assert_eq!(
            url,
            "http://volume-host:8777/internal/v1/hosts/host1@lvm/freeze"
        );
    }

    #[test]
    fn unconfigured_binary_is_rpc_error() {
        let rpc = rpc_with_endpoint();
        let err = rpc
            .control_url(Binary::Scheduler, "host1", "freeze")
            .unwrap_err();
        assert!(matches!(err, AdminError::Rpc(_)));
    }
}
