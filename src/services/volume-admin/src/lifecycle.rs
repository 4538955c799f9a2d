//! Lifecycle Controller Module
//!
//! The administrative core: service and cluster state transitions,
//! freeze/thaw, replication failover, and dynamic log-level control.
//! Every operation takes the negotiated API version explicitly and gates
//! its own parameters; handlers stay thin.
//!
//! Target resolution rules:
//! - A request body names its target by `host` or `cluster`, never both.
//! - The `cluster` field is only read when the negotiated version is at
//!   or above the action's cluster floor; below it the field is treated
//!   as absent.
//! - A body-named target that resolves to nothing is invalid input, not
//!   a missing resource.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use itertools::Itertools;
use storcore_shared::{mv, ApiVersion};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::config::LifecycleConfig;
use crate::models::{
    Binary, ClusterShowResponse, ClusterStatusResponse, ClusterTargetBody, ClusterView,
    ClustersListResponse, GetLogBody, HeartbeatRequest, LogLevel, LogLevelEntry,
    LogLevelsResponse, ServiceRecord, ServiceStatusResponse, ServiceTargetBody, ServiceView,
    ServicesListResponse, SetLogBody,
};
use crate::rpc::BackendRpc;
use crate::store::ServiceStore;
use crate::{AdminError, Result};

/// The service actions reachable through `PUT /v3/os-services/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Enable,
    Disable,
    DisableLogReason,
    Freeze,
    Thaw,
    /// Legacy host-only failover.
    FailoverHost,
    /// Cluster-aware failover.
    Failover,
    SetLog,
    GetLog,
}

impl ServiceAction {
    /// Map a path segment to an action. Unknown segments are simply not
    /// routes.
    pub fn from_path(segment: &str) -> Option<Self> {
        match segment {
            "enable" => Some(Self::Enable),
            "disable" => Some(Self::Disable),
            "disable-log-reason" => Some(Self::DisableLogReason),
            "freeze" => Some(Self::Freeze),
            "thaw" => Some(Self::Thaw),
            "failover_host" => Some(Self::FailoverHost),
            "failover" => Some(Self::Failover),
            "set-log" => Some(Self::SetLog),
            "get-log" => Some(Self::GetLog),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::DisableLogReason => "disable-log-reason",
            Self::Freeze => "freeze",
            Self::Thaw => "thaw",
            Self::FailoverHost => "failover_host",
            Self::Failover => "failover",
            Self::SetLog => "set-log",
            Self::GetLog => "get-log",
        }
    }

    /// Version floor below which the action does not exist.
    pub const fn min_version(&self) -> ApiVersion {
        match self {
            Self::Failover => mv::REPLICATION_CLUSTER,
            Self::SetLog | Self::GetLog => mv::LOG_LEVELS,
            _ => mv::BASE_VERSION,
        }
    }

    /// Version floor at which the `cluster` body field is honored, if
    /// the action can target a cluster at all.
    const fn cluster_floor(&self) -> Option<ApiVersion> {
        match self {
            Self::Enable | Self::Disable | Self::DisableLogReason | Self::Freeze | Self::Thaw => {
                Some(mv::CLUSTER_SUPPORT)
            }
            Self::Failover => Some(mv::REPLICATION_CLUSTER),
            _ => None,
        }
    }
}

/// The resolved target of a body-addressed action.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Host(String),
    Cluster(String),
}

/// Dynamic log levels of this API process, keyed by logger prefix. The
/// empty prefix is the root level.
pub struct LogControl {
    levels: DashMap<String, LogLevel>,
}

impl LogControl {
    pub fn new(root: LogLevel) -> Self {
        let levels = DashMap::new();
        levels.insert(String::new(), root);
        Self { levels }
    }

    pub fn set(&self, prefix: Option<&str>, level: LogLevel) {
        let key = prefix.unwrap_or_default().to_string();
        info!(prefix = %key, level = %level, "local log level updated");
        self.levels.insert(key, level);
    }

    /// Levels visible under `prefix`; no prefix returns everything.
    pub fn snapshot(&self, prefix: Option<&str>) -> HashMap<String, String> {
        self.levels
            .iter()
            .filter(|entry| prefix.map_or(true, |p| entry.key().starts_with(p)))
            .map(|entry| (entry.key().clone(), entry.value().to_string()))
            .collect()
    }
}

/// Orchestrates lifecycle operations over the store and the backend RPC
/// transport.
pub struct LifecycleController {
    store: Arc<dyn ServiceStore>,
    rpc: Arc<dyn BackendRpc>,
    logs: Arc<LogControl>,
    config: LifecycleConfig,
}

impl LifecycleController {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        rpc: Arc<dyn BackendRpc>,
        logs: Arc<LogControl>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            rpc,
            logs,
            config,
        }
    }

    pub fn log_control(&self) -> Arc<LogControl> {
        Arc::clone(&self.logs)
    }

    fn check_floor(&self, action: ServiceAction, version: ApiVersion) -> Result<()> {
        let min = action.min_version();
        if !version.matches(Some(min), None) {
            return Err(AdminError::UnsupportedVersion {
                action: action.name().to_string(),
                requested: version,
                min,
            });
        }
        Ok(())
    }

    /// Exactly one of `host` / `cluster` names the target; the cluster
    /// field is invisible below the action's floor.
    fn resolve_target(
        &self,
        action: ServiceAction,
        version: ApiVersion,
        body: &ServiceTargetBody,
    ) -> Result<Target> {
        let cluster = body.cluster.as_deref().filter(|_| {
            action
                .cluster_floor()
                .map_or(false, |floor| version.matches(Some(floor), None))
        });

        match (body.host.as_deref(), cluster) {
            (Some(host), None) if !host.trim().is_empty() => Ok(Target::Host(host.to_string())),
            (None, Some(cluster)) if !cluster.trim().is_empty() => {
                Ok(Target::Cluster(cluster.to_string()))
            }
            _ => Err(AdminError::InvalidInput(
                "Must specify either host or cluster name".to_string(),
            )),
        }
    }

    async fn resolve_service(&self, host: &str, binary: Binary) -> Result<ServiceRecord> {
        self.store
            .find_service(host, binary)
            .await?
            .ok_or_else(|| {
                AdminError::InvalidInput(format!(
                    "no service of binary {binary} matches host {host:?}"
                ))
            })
    }

    /// Services a log operation's `server` filter selects: the filter
    /// names either a host or a cluster.
    async fn log_targets(
        &self,
        binary: Binary,
        server: Option<&str>,
    ) -> Result<Vec<ServiceRecord>> {
        let records = self.store.list_services(None, Some(binary)).await?;
        Ok(records
            .into_iter()
            .filter(|rec| {
                server.map_or(true, |s| {
                    rec.matches_host(s) || rec.cluster_name.as_deref() == Some(s)
                })
            })
            .collect())
    }

    async fn cluster_members(&self, name: &str, binary: Binary) -> Result<Vec<ServiceRecord>> {
        if self.store.find_cluster(name, binary).await?.is_none() {
            return Err(AdminError::InvalidInput(format!(
                "no cluster named {name:?} with binary {binary}"
            )));
        }
        self.store.services_in_cluster(name, binary).await
    }

    /// `GET /v3/os-services`.
    pub async fn list_services(
        &self,
        version: ApiVersion,
        host: Option<&str>,
        binary: Option<Binary>,
    ) -> Result<ServicesListResponse> {
        let now = Utc::now();
        let threshold = self.config.down_threshold();
        let services = self
            .store
            .list_services(host, binary)
            .await?
            .iter()
            .map(|rec| {
                ServiceView::build(rec, version, self.config.extended_services, now, threshold)
            })
            .collect();
        Ok(ServicesListResponse { services })
    }

    /// Enable / disable / disable-log-reason.
    pub async fn set_service_status(
        &self,
        action: ServiceAction,
        version: ApiVersion,
        body: ServiceTargetBody,
    ) -> Result<ServiceStatusResponse> {
        self.check_floor(action, version)?;
        if action == ServiceAction::DisableLogReason && !self.config.extended_services {
            return Err(AdminError::NotFound(format!(
                "Action {}",
                action.name()
            )));
        }
        body.validate()
            .map_err(|e| AdminError::Validation(e.to_string()))?;
        if action == ServiceAction::DisableLogReason && body.disabled_reason.is_none() {
            return Err(AdminError::Validation(
                "'disabled_reason' is required".to_string(),
            ));
        }

        let disabled = action != ServiceAction::Enable;
        // Disabling stores a reason only with the extended capability;
        // enabling always clears it.
        let reason = match action {
            ServiceAction::DisableLogReason => body.disabled_reason.clone(),
            ServiceAction::Disable if self.config.extended_services => {
                body.disabled_reason.clone()
            }
            _ => None,
        };

        let binary = body
            .binary
            .as_deref()
            .ok_or_else(|| AdminError::InvalidInput("'binary' is required".to_string()))
            .and_then(Binary::from_str)?;

        match self.resolve_target(action, version, &body)? {
            Target::Host(host) => {
                let record = self.resolve_service(&host, binary).await?;
                let record = self
                    .store
                    .set_service_disabled(&record.host, binary, disabled, reason)
                    .await?;
                info!(host = %record.host, %binary, disabled, "service status changed");
                Ok(ServiceStatusResponse {
                    disabled,
                    status: status_word(disabled),
                    host: Some(record.host),
                    cluster: None,
                    binary: binary.to_string(),
                    disabled_reason: self
                        .config
                        .extended_services
                        .then(|| record.disabled_reason)
                        .flatten(),
                })
            }
            Target::Cluster(name) => {
                let record = self
                    .store
                    .set_cluster_disabled(&name, binary, disabled, reason)
                    .await
                    .map_err(|e| match e {
                        // The cluster is a body target here.
                        AdminError::NotFound(what) => AdminError::InvalidInput(what),
                        other => other,
                    })?;
                info!(cluster = %record.name, %binary, disabled, "cluster status changed");
                Ok(ServiceStatusResponse {
                    disabled,
                    status: status_word(disabled),
                    host: None,
                    cluster: Some(record.name),
                    binary: binary.to_string(),
                    disabled_reason: self
                        .config
                        .extended_services
                        .then(|| record.disabled_reason)
                        .flatten(),
                })
            }
        }
    }

    /// Freeze or thaw scheduling to a volume backend host or cluster.
    pub async fn set_frozen(
        &self,
        action: ServiceAction,
        version: ApiVersion,
        body: ServiceTargetBody,
    ) -> Result<()> {
        self.check_floor(action, version)?;
        let frozen = action == ServiceAction::Freeze;
        let binary = self.volume_only_binary(&body)?;

        match self.resolve_target(action, version, &body)? {
            Target::Host(host) => {
                let record = self.resolve_service(&host, binary).await?;
                if frozen {
                    self.rpc.freeze_host(binary, &record.host).await?;
                } else {
                    self.rpc.thaw_host(binary, &record.host).await?;
                }
                self.store
                    .set_service_frozen(&record.host, binary, frozen)
                    .await?;
                info!(host = %record.host, frozen, "backend freeze state changed");
            }
            Target::Cluster(name) => {
                let members = self.cluster_members(&name, binary).await?;
                // Deliver the whole fan-out before touching any record: a
                // transport failure must leave no partially-updated state.
                for member in &members {
                    if frozen {
                        self.rpc.freeze_host(binary, &member.host).await?;
                    } else {
                        self.rpc.thaw_host(binary, &member.host).await?;
                    }
                }
                for member in &members {
                    self.store
                        .set_service_frozen(&member.host, binary, frozen)
                        .await?;
                }
                self.store.set_cluster_frozen(&name, binary, frozen).await?;
                info!(cluster = %name, frozen, hosts = members.len(), "cluster freeze state changed");
            }
        }
        Ok(())
    }

    /// Replication failover of a backend host (or, at the newer action,
    /// a whole cluster) to a secondary backend.
    pub async fn failover(
        &self,
        action: ServiceAction,
        version: ApiVersion,
        body: ServiceTargetBody,
    ) -> Result<()> {
        self.check_floor(action, version)?;
        let binary = self.volume_only_binary(&body)?;
        let backend_id = body.backend_id.clone();

        match self.resolve_target(action, version, &body)? {
            Target::Host(host) => {
                let record = self.resolve_service(&host, binary).await?;
                self.rpc
                    .failover_host(binary, &record.host, None, backend_id)
                    .await?;
                info!(host = %record.host, "failover dispatched");
            }
            Target::Cluster(name) => {
                let members = self.cluster_members(&name, binary).await?;
                for member in &members {
                    self.rpc
                        .failover_host(
                            binary,
                            &member.host,
                            Some(name.clone()),
                            backend_id.clone(),
                        )
                        .await?;
                }
                info!(cluster = %name, hosts = members.len(), "cluster failover dispatched");
            }
        }
        Ok(())
    }

    /// Fan a log-level change out to the targeted services. Local API
    /// levels apply immediately; backend deliveries are sequential and
    /// best-effort, with failures aggregated.
    pub async fn set_log(&self, version: ApiVersion, body: SetLogBody) -> Result<()> {
        self.check_floor(ServiceAction::SetLog, version)?;
        let level = body
            .level
            .as_deref()
            .ok_or_else(|| AdminError::InvalidInput("'level' is required".to_string()))
            .and_then(LogLevel::from_str)?;
        let binaries = parse_binary_filter(body.binary.as_deref())?;
        let server = body.server.as_deref();
        let prefix = body.prefix.as_deref();

        let mut failed: Vec<String> = Vec::new();
        for binary in binaries {
            if binary == Binary::Api {
                if server.map_or(true, |s| s == self.config.local_host) {
                    self.logs.set(prefix, level);
                }
                continue;
            }
            for record in self.log_targets(binary, server).await? {
                match self
                    .rpc
                    .set_log_levels(binary, &record.host, prefix.map(str::to_string), level)
                    .await
                {
                    Ok(()) => debug!(host = %record.host, %binary, %level, "log level delivered"),
                    Err(e) => {
                        warn!(host = %record.host, %binary, error = %e, "log level delivery failed");
                        failed.push(format!("{binary}@{}", record.host));
                    }
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(AdminError::Rpc(format!(
                "set-log failed for: {}",
                failed.iter().join(", ")
            )))
        }
    }

    /// Collect effective log levels from the targeted services. Backend
    /// reads are best-effort; an unreachable backend is skipped with a
    /// warning.
    pub async fn get_log(&self, version: ApiVersion, body: GetLogBody) -> Result<LogLevelsResponse> {
        self.check_floor(ServiceAction::GetLog, version)?;
        let binaries = parse_binary_filter(body.binary.as_deref())?;
        let server = body.server.as_deref();
        let prefix = body.prefix.as_deref();

        let mut entries: Vec<LogLevelEntry> = Vec::new();
        for binary in binaries {
            if binary == Binary::Api {
                if server.map_or(true, |s| s == self.config.local_host) {
                    entries.push(LogLevelEntry {
                        binary: binary.to_string(),
                        host: self.config.local_host.clone(),
                        levels: self.logs.snapshot(prefix),
                    });
                }
                continue;
            }
            for record in self.log_targets(binary, server).await? {
                match self
                    .rpc
                    .get_log_levels(binary, &record.host, prefix.map(str::to_string))
                    .await
                {
                    Ok(levels) => entries.push(LogLevelEntry {
                        binary: binary.to_string(),
                        host: record.host.clone(),
                        levels,
                    }),
                    Err(e) => {
                        warn!(host = %record.host, %binary, error = %e, "log level read failed")
                    }
                }
            }
        }

        entries.sort_by(|a, b| (a.binary.clone(), a.host.clone()).cmp(&(b.binary.clone(), b.host.clone())));
        Ok(LogLevelsResponse {
            log_levels: entries,
        })
    }

    /// `POST /internal/v1/heartbeat` from backend processes.
    pub async fn heartbeat(&self, req: HeartbeatRequest) -> Result<ServiceRecord> {
        req.validate()
            .map_err(|e| AdminError::Validation(e.to_string()))?;
        self.store.record_heartbeat(req).await
    }

    /// `GET /v3/clusters` / `GET /v3/clusters/detail`.
    pub async fn list_clusters(
        &self,
        version: ApiVersion,
        detail: bool,
        name: Option<&str>,
        binary: Option<Binary>,
    ) -> Result<ClustersListResponse> {
        self.check_cluster_api(version)?;
        let now = Utc::now();
        let threshold = self.config.down_threshold();

        let mut clusters = Vec::new();
        for record in self.store.list_clusters(name, binary).await? {
            let counts = if detail {
                Some(
                    self.store
                        .cluster_host_counts(&record.name, record.binary, now, threshold)
                        .await?,
                )
            } else {
                None
            };
            clusters.push(ClusterView::build(
                &record, version, detail, counts, now, threshold,
            ));
        }
        Ok(ClustersListResponse { clusters })
    }

    /// `GET /v3/clusters/{name}`. The name is a path resource.
    pub async fn show_cluster(
        &self,
        version: ApiVersion,
        name: &str,
        binary: Option<Binary>,
    ) -> Result<ClusterShowResponse> {
        self.check_cluster_api(version)?;
        let binary = binary.unwrap_or(Binary::Volume);
        let record = self
            .store
            .find_cluster(name, binary)
            .await?
            .ok_or_else(|| AdminError::NotFound(format!("Cluster {name}")))?;

        let now = Utc::now();
        let threshold = self.config.down_threshold();
        let counts = self
            .store
            .cluster_host_counts(name, binary, now, threshold)
            .await?;
        Ok(ClusterShowResponse {
            cluster: ClusterView::build(&record, version, true, Some(counts), now, threshold),
        })
    }

    /// `PUT /v3/clusters/{enable|disable}`. The cluster is named in the
    /// body.
    pub async fn set_cluster_status(
        &self,
        version: ApiVersion,
        disable: bool,
        body: ClusterTargetBody,
    ) -> Result<ClusterStatusResponse> {
        self.check_cluster_api(version)?;
        body.validate()
            .map_err(|e| AdminError::Validation(e.to_string()))?;

        let binary = match body.binary.as_deref() {
            Some(raw) => Binary::from_str(raw)?,
            None => Binary::Volume,
        };
        let reason = if disable {
            body.disabled_reason.clone()
        } else {
            None
        };

        let record = self
            .store
            .set_cluster_disabled(&body.name, binary, disable, reason)
            .await?;
        info!(cluster = %record.name, %binary, disabled = disable, "cluster status changed");

        Ok(ClusterStatusResponse {
            name: record.name,
            binary: binary.to_string(),
            disabled: disable,
            status: status_word(disable),
            disabled_reason: record.disabled_reason,
        })
    }

    fn check_cluster_api(&self, version: ApiVersion) -> Result<()> {
        if !version.matches(Some(mv::CLUSTER_SUPPORT), None) {
            return Err(AdminError::UnsupportedVersion {
                action: "clusters".to_string(),
                requested: version,
                min: mv::CLUSTER_SUPPORT,
            });
        }
        Ok(())
    }

    /// Freeze, thaw and failover only ever address volume backends.
    fn volume_only_binary(&self, body: &ServiceTargetBody) -> Result<Binary> {
        match body.binary.as_deref() {
            None => Ok(Binary::Volume),
            Some(raw) => {
                let binary = Binary::from_str(raw)?;
                if binary != Binary::Volume {
                    return Err(AdminError::InvalidInput(format!(
                        "this action applies to {} only",
                        Binary::Volume
                    )));
                }
                Ok(binary)
            }
        }
    }
}

fn status_word(disabled: bool) -> String {
    if disabled { "disabled" } else { "enabled" }.to_string()
}

/// `None`, empty, or `*` selects every binary.
fn parse_binary_filter(raw: Option<&str>) -> Result<Vec<Binary>> {
    match raw {
        None | Some("") | Some("*") => Ok(Binary::all().to_vec()),
        Some(name) => Ok(vec![Binary::from_str(name)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockBackendRpc;
    use crate::store::InMemoryStore;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn config() -> LifecycleConfig {
        LifecycleConfig {
            local_host: "api-host".to_string(),
            service_down_time_secs: 60,
            extended_services: true,
        }
    }

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        for (binary, host, cluster) in [
            (Binary::Volume, "host1@lvm", Some("c1")),
            (Binary::Volume, "host2@lvm", Some("c1")),
            (Binary::Scheduler, "sched1", None),
        ] {
            store.insert_service(ServiceRecord {
                binary,
                host: host.to_string(),
                cluster_name: cluster.map(str::to_string),
                availability_zone: "nova".to_string(),
                disabled: false,
                disabled_reason: None,
                frozen: false,
                replication_status: None,
                active_backend_id: None,
                created_at: now,
                updated_at: Some(now),
                modified_at: None,
            });
        }
        store.insert_cluster(crate::models::ClusterRecord {
            name: "c1".to_string(),
            binary: Binary::Volume,
            disabled: false,
            disabled_reason: None,
            frozen: false,
            replication_status: None,
            active_backend_id: None,
            created_at: now,
            updated_at: Some(now),
            modified_at: None,
        });
        store
    }

    fn controller_with(rpc: MockBackendRpc) -> LifecycleController {
        LifecycleController::new(
            seeded_store(),
            Arc::new(rpc),
            Arc::new(LogControl::new(LogLevel::Info)),
            config(),
        )
    }

    fn controller() -> LifecycleController {
        controller_with(MockBackendRpc::new())
    }

    fn body(host: Option<&str>, cluster: Option<&str>, binary: Option<&str>) -> ServiceTargetBody {
        ServiceTargetBody {
            host: host.map(str::to_string),
            cluster: cluster.map(str::to_string),
            binary: binary.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn disable_resolves_host_prefix() {
        let ctl = controller();
        let resp = ctl
            .set_service_status(
                ServiceAction::Disable,
                mv::BASE_VERSION,
                body(Some("host1"), None, Some("storcore-volume")),
            )
            .await
            .unwrap();
        assert!(resp.disabled);
        assert_eq!(resp.status, "disabled");
        assert_eq!(resp.host.as_deref(), Some("host1@lvm"));
    }

    #[tokio::test]
    async fn cluster_field_is_invisible_below_floor() {
        let ctl = controller();
        let err = ctl
            .set_service_status(
                ServiceAction::Disable,
                mv::BASE_VERSION,
                body(None, Some("c1"), Some("volume")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidInput(_)));
        assert!(err.to_string().contains("host or cluster"));
    }

    #[tokio::test]
    async fn cluster_disable_at_floor_cascades() {
        let ctl = controller();
        let resp = ctl
            .set_service_status(
                ServiceAction::Disable,
                mv::CLUSTER_SUPPORT,
                body(None, Some("c1"), Some("volume")),
            )
            .await
            .unwrap();
        assert_eq!(resp.cluster.as_deref(), Some("c1"));
        assert!(resp.host.is_none());

        let listing = ctl
            .list_services(mv::CLUSTER_SUPPORT, None, Some(Binary::Volume))
            .await
            .unwrap();
        assert!(listing
            .services
            .iter()
            .all(|svc| svc.status == "disabled"));
    }

    #[tokio::test]
    async fn both_host_and_cluster_is_invalid() {
        let ctl = controller();
        let err = ctl
            .set_service_status(
                ServiceAction::Enable,
                mv::CLUSTER_SUPPORT,
                body(Some("host1"), Some("c1"), Some("volume")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unresolved_host_is_invalid_input_not_missing() {
        let ctl = controller();
        let err = ctl
            .set_service_status(
                ServiceAction::Disable,
                mv::BASE_VERSION,
                body(Some("ghost"), None, Some("volume")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn disable_log_reason_stores_the_reason() {
        let ctl = controller();
        let mut req = body(Some("host1@lvm"), None, Some("volume"));
        req.disabled_reason = Some("maintenance".to_string());
        let resp = ctl
            .set_service_status(ServiceAction::DisableLogReason, mv::BASE_VERSION, req)
            .await
            .unwrap();
        assert_eq!(resp.disabled_reason.as_deref(), Some("maintenance"));
    }

    #[tokio::test]
    async fn disable_log_reason_requires_a_reason() {
        let ctl = controller();
        let err = ctl
            .set_service_status(
                ServiceAction::DisableLogReason,
                mv::BASE_VERSION,
                body(Some("host1@lvm"), None, Some("volume")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation(_)));

        // The plain disable action still accepts an absent reason.
        let resp = ctl
            .set_service_status(
                ServiceAction::Disable,
                mv::BASE_VERSION,
                body(Some("host1@lvm"), None, Some("volume")),
            )
            .await
            .unwrap();
        assert!(resp.disabled);
    }

    #[tokio::test]
    async fn disable_log_reason_requires_extended_services() {
        let mut cfg = config();
        cfg.extended_services = false;
        let ctl = LifecycleController::new(
            seeded_store(),
            Arc::new(MockBackendRpc::new()),
            Arc::new(LogControl::new(LogLevel::Info)),
            cfg,
        );
        let mut req = body(Some("host1@lvm"), None, Some("volume"));
        req.disabled_reason = Some("maintenance".to_string());
        let err = ctl
            .set_service_status(ServiceAction::DisableLogReason, mv::BASE_VERSION, req)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::NotFound(_)));
    }

    #[tokio::test]
    async fn freeze_calls_backend_and_marks_record() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_freeze_host()
            .with(eq(Binary::Volume), eq("host1@lvm"))
            .times(1)
            .returning(|_, _| Ok(()));
        let ctl = controller_with(rpc);

        ctl.set_frozen(
            ServiceAction::Freeze,
            mv::BASE_VERSION,
            body(Some("host1"), None, None),
        )
        .await
        .unwrap();

        let listing = ctl
            .list_services(mv::BASE_VERSION, Some("host1"), Some(Binary::Volume))
            .await
            .unwrap();
        assert_eq!(listing.services[0].frozen, Some(true));
    }

    #[tokio::test]
    async fn freeze_rejects_non_volume_binary() {
        let ctl = controller();
        let err = ctl
            .set_frozen(
                ServiceAction::Freeze,
                mv::BASE_VERSION,
                body(Some("sched1"), None, Some("scheduler")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn cluster_freeze_failure_leaves_records_untouched() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_freeze_host().returning(|_, host| {
            if host == "host2@lvm" {
                Err(AdminError::RpcTimeout(host.to_string()))
            } else {
                Ok(())
            }
        });
        let ctl = controller_with(rpc);

        let err = ctl
            .set_frozen(
                ServiceAction::Freeze,
                mv::CLUSTER_SUPPORT,
                body(None, Some("c1"), None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::RpcTimeout(_)));

        let listing = ctl
            .list_services(mv::CLUSTER_SUPPORT, None, Some(Binary::Volume))
            .await
            .unwrap();
        assert!(listing
            .services
            .iter()
            .all(|svc| svc.frozen == Some(false)));
    }

    #[tokio::test]
    async fn rpc_timeout_is_surfaced_distinctly() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_freeze_host()
            .returning(|_, host| Err(AdminError::RpcTimeout(host.to_string())));
        let ctl = controller_with(rpc);

        let err = ctl
            .set_frozen(
                ServiceAction::Freeze,
                mv::BASE_VERSION,
                body(Some("host1"), None, None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::RpcTimeout(_)));
    }

    #[tokio::test]
    async fn failover_action_requires_replication_floor() {
        let ctl = controller();
        let err = ctl
            .failover(
                ServiceAction::Failover,
                mv::CLUSTER_SUPPORT,
                body(None, Some("c1"), None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::UnsupportedVersion { .. }));
    }

    #[tokio::test]
    async fn legacy_failover_never_reads_cluster() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_failover_host()
            .with(
                eq(Binary::Volume),
                eq("host1@lvm"),
                eq(None::<String>),
                eq(Some("backup-site".to_string())),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let ctl = controller_with(rpc);

        let mut req = body(Some("host1"), Some("c1"), None);
        req.backend_id = Some("backup-site".to_string());
        // At the top version the cluster field would normally win, but
        // the legacy action never honors it, so host is the one target.
        let err = ctl
            .failover(ServiceAction::FailoverHost, mv::MAX_VERSION, req.clone())
            .await;
        // Both host and cluster present would be ambiguous for the new
        // action; the legacy one simply never sees cluster.
        assert!(err.is_ok());
    }

    #[tokio::test]
    async fn cluster_failover_fans_out_to_members() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_failover_host()
            .withf(|_, host, cluster, _| {
                cluster.as_deref() == Some("c1") && host.starts_with("host")
            })
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        let ctl = controller_with(rpc);

        ctl.failover(
            ServiceAction::Failover,
            mv::REPLICATION_CLUSTER,
            body(None, Some("c1"), None),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn set_log_below_floor_is_unsupported() {
        let ctl = controller();
        let err = ctl
            .set_log(
                mv::CLUSTER_SUPPORT,
                SetLogBody {
                    level: Some("DEBUG".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::UnsupportedVersion { .. }));
    }

    #[tokio::test]
    async fn set_log_requires_a_valid_level() {
        let ctl = controller();
        let err = ctl
            .set_log(mv::LOG_LEVELS, SetLogBody::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidInput(_)));

        let err = ctl
            .set_log(
                mv::LOG_LEVELS,
                SetLogBody {
                    level: Some("verbose".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn set_log_fans_out_and_aggregates_failures() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_set_log_levels()
            .returning(|_, host, _, _| {
                if host == "host2@lvm" {
                    Err(AdminError::RpcTimeout(host.to_string()))
                } else {
                    Ok(())
                }
            });
        let ctl = controller_with(rpc);

        let err = ctl
            .set_log(
                mv::LOG_LEVELS,
                SetLogBody {
                    level: Some("debug".to_string()),
                    binary: Some("storcore-volume".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Rpc(_)));
        assert!(err.to_string().contains("host2@lvm"));
    }

    #[tokio::test]
    async fn set_log_server_filter_selects_cluster_members() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_set_log_levels()
            .withf(|_, host, _, _| host.ends_with("@lvm"))
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        let ctl = controller_with(rpc);

        ctl.set_log(
            mv::LOG_LEVELS,
            SetLogBody {
                level: Some("debug".to_string()),
                binary: Some("storcore-volume".to_string()),
                server: Some("c1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn get_log_server_filter_matches_cluster_name() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_get_log_levels()
            .returning(|_, _, _| Ok(HashMap::new()));
        let ctl = controller_with(rpc);

        let resp = ctl
            .get_log(
                mv::LOG_LEVELS,
                GetLogBody {
                    binary: Some("volume".to_string()),
                    server: Some("c1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let hosts: Vec<&str> = resp.log_levels.iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, vec!["host1@lvm", "host2@lvm"]);
    }

    #[tokio::test]
    async fn set_log_updates_local_api_levels() {
        let ctl = controller();
        ctl.set_log(
            mv::LOG_LEVELS,
            SetLogBody {
                level: Some("error".to_string()),
                binary: Some("storcore-api".to_string()),
                prefix: Some("storcore.volume".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let snapshot = ctl.log_control().snapshot(Some("storcore.volume"));
        assert_eq!(snapshot.get("storcore.volume").map(String::as_str), Some("ERROR"));
    }

    #[tokio::test]
    async fn get_log_skips_unreachable_backends() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_get_log_levels().returning(|_, host, _| {
            if host == "host2@lvm" {
                Err(AdminError::Rpc("boom".to_string()))
            } else {
                Ok(HashMap::from([("".to_string(), "INFO".to_string())]))
            }
        });
        let ctl = controller_with(rpc);

        let resp = ctl
            .get_log(
                mv::LOG_LEVELS,
                GetLogBody {
                    binary: Some("volume".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let hosts: Vec<&str> = resp.log_levels.iter().map(|e| e.host.as_str()).collect();
        assert_eq!(hosts, vec!["host1@lvm"]);
    }

    #[tokio::test]
    async fn get_log_includes_local_api_entry() {
        let mut rpc = MockBackendRpc::new();
        rpc.expect_get_log_levels()
            .returning(|_, _, _| Ok(HashMap::new()));
        let ctl = controller_with(rpc);

        let resp = ctl
            .get_log(mv::LOG_LEVELS, GetLogBody::default())
            .await
            .unwrap();
        let api_entry = resp
            .log_levels
            .iter()
            .find(|e| e.binary == "storcore-api")
            .expect("local api entry");
        assert_eq!(api_entry.host, "api-host");
        assert_eq!(api_entry.levels.get("").map(String::as_str), Some("INFO"));
    }

    #[tokio::test]
    async fn clusters_api_requires_floor() {
        let ctl = controller();
        let err = ctl
            .list_clusters(mv::BASE_VERSION, false, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::UnsupportedVersion { .. }));
    }

    #[tokio::test]
    async fn cluster_detail_counts_hosts() {
        let ctl = controller();
        let resp = ctl
            .list_clusters(mv::CLUSTER_SUPPORT, true, None, None)
            .await
            .unwrap();
        assert_eq!(resp.clusters.len(), 1);
        assert_eq!(resp.clusters[0].num_hosts, Some(2));
        assert_eq!(resp.clusters[0].num_down_hosts, Some(0));
    }

    #[tokio::test]
    async fn unknown_cluster_show_is_not_found() {
        let ctl = controller();
        let err = ctl
            .show_cluster(mv::CLUSTER_SUPPORT, "ghost", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::NotFound(_)));
    }

    #[tokio::test]
    async fn cluster_disable_by_body_name() {
        let ctl = controller();
        let resp = ctl
            .set_cluster_status(
                mv::CLUSTER_SUPPORT,
                true,
                ClusterTargetBody {
                    name: "c1".to_string(),
                    binary: None,
                    disabled_reason: Some("drain".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(resp.disabled);
        assert_eq!(resp.disabled_reason.as_deref(), Some("drain"));
    }

    #[tokio::test]
    async fn action_path_segments_round_trip() {
        for action in [
            ServiceAction::Enable,
            ServiceAction::Disable,
            ServiceAction::DisableLogReason,
            ServiceAction::Freeze,
            ServiceAction::Thaw,
            ServiceAction::FailoverHost,
            ServiceAction::Failover,
            ServiceAction::SetLog,
            ServiceAction::GetLog,
        ] {
            assert_eq!(ServiceAction::from_path(action.name()), Some(action));
        }
        assert_eq!(ServiceAction::from_path("restart"), None);
    }
}
