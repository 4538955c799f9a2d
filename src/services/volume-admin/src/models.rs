//! Volume Admin Models
//!
//! Records for backend service processes and clusters, the wire-level
//! request/response types of the admin API, and the derived-liveness
//! rules. Liveness is never stored: a record is `up` when its most
//! recent timestamp is within the configured down-time threshold.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use storcore_shared::{mv, ApiVersion};
use validator::{Validate, ValidationError};

use crate::AdminError;

/// Logical identity of a backend service process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binary {
    #[serde(rename = "storcore-api")]
    Api,
    #[serde(rename = "storcore-scheduler")]
    Scheduler,
    #[serde(rename = "storcore-volume")]
    Volume,
    #[serde(rename = "storcore-backup")]
    Backup,
}

impl Binary {
    /// The name used on the wire and in configuration.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Binary::Api => "storcore-api",
            Binary::Scheduler => "storcore-scheduler",
            Binary::Volume => "storcore-volume",
            Binary::Backup => "storcore-backup",
        }
    }

    /// All known binaries, in listing order.
    pub const fn all() -> [Binary; 4] {
        [Binary::Api, Binary::Scheduler, Binary::Volume, Binary::Backup]
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Binary {
    type Err = AdminError;

    /// Accepts the wire name or the bare suffix (`volume` for
    /// `storcore-volume`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "storcore-api" | "api" => Ok(Binary::Api),
            "storcore-scheduler" | "scheduler" => Ok(Binary::Scheduler),
            "storcore-volume" | "volume" => Ok(Binary::Volume),
            "storcore-backup" | "backup" => Ok(Binary::Backup),
            other => Err(AdminError::InvalidInput(format!(
                "unknown binary {other:?}"
            ))),
        }
    }
}

/// Recognized dynamic log levels, case-insensitive on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Canonical rendering of the level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(AdminError::InvalidInput(format!(
                "{other:?} is not a valid log level"
            ))),
        }
    }
}

/// One running backend process.
///
/// Created and refreshed by the owning process's heartbeats; the admin
/// layer only ever mutates `disabled` and `disabled_reason`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub binary: Binary,

    /// Host identity; may encode `host@backend#pool` topology.
    pub host: String,

    pub cluster_name: Option<String>,

    pub availability_zone: String,

    pub disabled: bool,

    pub disabled_reason: Option<String>,

    /// Volume binary only: backend is administratively frozen.
    pub frozen: bool,

    /// Volume binary only.
    pub replication_status: Option<String>,

    /// Volume binary only.
    pub active_backend_id: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Last heartbeat.
    pub updated_at: Option<DateTime<Utc>>,

    /// Last administrative mutation.
    pub modified_at: Option<DateTime<Utc>>,
}

impl ServiceRecord {
    /// The effective last-seen timestamp: `modified_at` when it is at
    /// least as recent (by absolute delta from `now`) as `updated_at`,
    /// else `updated_at`, falling back to `created_at`.
    pub fn last_seen(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        last_seen(now, self.created_at, self.updated_at, self.modified_at)
    }

    /// Derived liveness against the configured down-time threshold.
    pub fn is_up(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        (now - self.last_seen(now)).abs() <= threshold
    }

    /// Whether `requested` identifies this record: exact host match, or
    /// `requested` equals the segment before `@` of a
    /// `host@backend` topology string.
    pub fn matches_host(&self, requested: &str) -> bool {
        if self.host == requested {
            return true;
        }
        match self.host.split_once('@') {
            Some((prefix, _)) => prefix == requested,
            None => false,
        }
    }
}

/// A named group of same-binary services sharing administrative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,

    pub binary: Binary,

    pub disabled: bool,

    pub disabled_reason: Option<String>,

    pub frozen: bool,

    pub replication_status: Option<String>,

    pub active_backend_id: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: Option<DateTime<Utc>>,

    pub modified_at: Option<DateTime<Utc>>,
}

impl ClusterRecord {
    /// Same derived-liveness rule as [`ServiceRecord::last_seen`].
    pub fn last_seen(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        last_seen(now, self.created_at, self.updated_at, self.modified_at)
    }

    pub fn is_up(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        (now - self.last_seen(now)).abs() <= threshold
    }
}

fn last_seen(
    now: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    modified_at: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let updated = updated_at.unwrap_or(created_at);
    match modified_at {
        Some(modified) if (now - modified).abs() <= (now - updated).abs() => modified,
        _ => updated,
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Body of the host/cluster-targeted service actions (enable, disable,
/// disable-log-reason, freeze, thaw, failover_host, failover).
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ServiceTargetBody {
    pub host: Option<String>,

    pub cluster: Option<String>,

    /// Binary wire name; `service` is the legacy alias.
    #[serde(alias = "service")]
    pub binary: Option<String>,

    /// Audit reason stored when disabling.
    #[validate(length(min = 1, max = 255), custom = "not_blank")]
    pub disabled_reason: Option<String>,

    /// Failover only: the replication target.
    pub backend_id: Option<String>,
}

/// Body of the set-log action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetLogBody {
    pub level: Option<String>,
    pub binary: Option<String>,
    pub server: Option<String>,
    pub prefix: Option<String>,
}

/// Body of the get-log action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetLogBody {
    pub binary: Option<String>,
    pub server: Option<String>,
    pub prefix: Option<String>,
}

/// Body of the cluster enable/disable actions.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClusterTargetBody {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// Binary wire name; defaults to the volume binary.
    pub binary: Option<String>,

    #[validate(length(min = 1, max = 255), custom = "not_blank")]
    pub disabled_reason: Option<String>,
}

/// Heartbeat reported by a backend process. Creates the service record
/// on first report.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct HeartbeatRequest {
    pub binary: Binary,

    #[validate(length(min = 1, max = 255))]
    pub host: String,

    pub cluster_name: Option<String>,

    pub availability_zone: Option<String>,

    pub replication_status: Option<String>,

    pub active_backend_id: Option<String>,

    pub frozen: Option<bool>,
}

/// One service entry in a listing. Keys above the caller's negotiated
/// version are omitted entirely, never rendered as null.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    pub binary: String,
    pub host: String,
    pub zone: String,
    pub status: String,
    pub state: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_status: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_backend_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_state: Option<String>,
}

impl ServiceView {
    /// Render a record for the negotiated version.
    pub fn build(
        record: &ServiceRecord,
        version: ApiVersion,
        extended_services: bool,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Self {
        let up = record.is_up(now, threshold);
        let mut view = ServiceView {
            binary: record.binary.to_string(),
            host: record.host.clone(),
            zone: record.availability_zone.clone(),
            status: if record.disabled { "disabled" } else { "enabled" }.to_string(),
            state: if up { "up" } else { "down" }.to_string(),
            updated_at: record.updated_at,
            cluster: None,
            disabled_reason: None,
            replication_status: None,
            active_backend_id: None,
            frozen: None,
            backend_state: None,
        };

        if version.matches(Some(mv::CLUSTER_SUPPORT), None) {
            view.cluster = Some(record.cluster_name.clone());
        }

        if extended_services {
            view.disabled_reason = Some(record.disabled_reason.clone());
            if record.binary == Binary::Volume {
                view.replication_status = Some(record.replication_status.clone());
                view.active_backend_id = Some(record.active_backend_id.clone());
                view.frozen = Some(record.frozen);
            }
        }

        if record.binary == Binary::Volume && version.matches(Some(mv::BACKEND_STATE_REPORT), None)
        {
            view.backend_state = Some(if up { "up" } else { "down" }.to_string());
        }

        view
    }
}

/// One cluster entry in a listing or show response.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub name: String,
    pub binary: String,
    pub state: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_hosts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_down_hosts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_status: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_backend_id: Option<Option<String>>,
}

impl ClusterView {
    /// Render a cluster for the negotiated version. `host_counts` is
    /// `(num_hosts, num_down_hosts)` and only present in detail views.
    pub fn build(
        record: &ClusterRecord,
        version: ApiVersion,
        detail: bool,
        host_counts: Option<(u32, u32)>,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Self {
        let mut view = ClusterView {
            name: record.name.clone(),
            binary: record.binary.to_string(),
            state: if record.is_up(now, threshold) { "up" } else { "down" }.to_string(),
            status: if record.disabled { "disabled" } else { "enabled" }.to_string(),
            num_hosts: None,
            num_down_hosts: None,
            disabled_reason: None,
            created_at: None,
            updated_at: None,
            replication_status: None,
            frozen: None,
            active_backend_id: None,
        };

        if detail {
            let (num_hosts, num_down_hosts) = host_counts.unwrap_or((0, 0));
            view.num_hosts = Some(num_hosts);
            view.num_down_hosts = Some(num_down_hosts);
            view.disabled_reason = Some(record.disabled_reason.clone());
            view.created_at = Some(record.created_at);
            view.updated_at = Some(record.updated_at);
        }

        if version.matches(Some(mv::REPLICATION_CLUSTER), None) {
            view.replication_status = Some(record.replication_status.clone());
            view.frozen = Some(record.frozen);
            view.active_backend_id = Some(record.active_backend_id.clone());
        }

        view
    }
}

/// Listing envelope for `GET /v3/os-services`.
#[derive(Debug, Clone, Serialize)]
pub struct ServicesListResponse {
    pub services: Vec<ServiceView>,
}

/// Listing envelope for `GET /v3/clusters`.
#[derive(Debug, Clone, Serialize)]
pub struct ClustersListResponse {
    pub clusters: Vec<ClusterView>,
}

/// Envelope for `GET /v3/clusters/{name}`.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterShowResponse {
    pub cluster: ClusterView,
}

/// Response of the enable/disable family of service actions.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatusResponse {
    pub disabled: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub binary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

/// Response of the cluster enable/disable actions.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatusResponse {
    pub name: String,
    pub binary: String,
    pub disabled: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

/// One fan-out result entry of get-log.
#[derive(Debug, Clone, Serialize)]
pub struct LogLevelEntry {
    pub binary: String,
    pub host: String,
    pub levels: HashMap<String, String>,
}

/// Envelope for get-log.
#[derive(Debug, Clone, Serialize)]
pub struct LogLevelsResponse {
    pub log_levels: Vec<LogLevelEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use storcore_shared::mv;

    fn record(binary: Binary, host: &str) -> ServiceRecord {
        let now = Utc::now();
        ServiceRecord {
            binary,
            host: host.to_string(),
            cluster_name: None,
            availability_zone: "nova".to_string(),
            disabled: false,
            disabled_reason: None,
            frozen: false,
            replication_status: None,
            active_backend_id: None,
            created_at: now,
            updated_at: Some(now),
            modified_at: None,
        }
    }

    #[test]
    fn binary_parses_wire_and_bare_names() {
        assert_eq!("storcore-volume".parse::<Binary>().unwrap(), Binary::Volume);
        assert_eq!("volume".parse::<Binary>().unwrap(), Binary::Volume);
        assert!("nova-compute".parse::<Binary>().is_err());
    }

    #[test]
    fn log_level_is_case_insensitive() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn host_matching_honors_backend_topology() {
        let mut rec = record(Binary::Volume, "host1@lvm#pool");
        assert!(rec.matches_host("host1"));
        assert!(rec.matches_host("host1@lvm#pool"));
        assert!(!rec.matches_host("host1@lvm"));
        assert!(!rec.matches_host("host2"));

        rec.host = "host1".to_string();
        assert!(rec.matches_host("host1"));
        assert!(!rec.matches_host("host"));
    }

    #[test]
    fn last_seen_prefers_most_recent_timestamp() {
        let now = Utc::now();
        let mut rec = record(Binary::Volume, "host1");
        rec.created_at = now - Duration::hours(2);
        rec.updated_at = Some(now - Duration::minutes(10));
        rec.modified_at = Some(now - Duration::minutes(1));
        assert_eq!(rec.last_seen(now), now - Duration::minutes(1));

        rec.modified_at = Some(now - Duration::minutes(30));
        assert_eq!(rec.last_seen(now), now - Duration::minutes(10));

        rec.updated_at = None;
        rec.modified_at = None;
        assert_eq!(rec.last_seen(now), rec.created_at);
    }

    #[test]
    fn liveness_compares_against_threshold() {
        let now = Utc::now();
        let mut rec = record(Binary::Volume, "host1");
        rec.updated_at = Some(now - Duration::seconds(30));
        assert!(rec.is_up(now, Duration::seconds(60)));
        assert!(!rec.is_up(now, Duration::seconds(10)));
    }

    #[test]
    fn base_version_view_has_no_cluster_key() {
        let rec = record(Binary::Volume, "host1");
        let view = ServiceView::build(
            &rec,
            mv::BASE_VERSION,
            false,
            Utc::now(),
            Duration::seconds(60),
        );
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("cluster").is_none());
        assert!(json.get("disabled_reason").is_none());
        assert_eq!(json["status"], "enabled");
        assert_eq!(json["state"], "up");
    }

    #[test]
    fn cluster_support_view_includes_cluster_key() {
        let mut rec = record(Binary::Volume, "host1");
        rec.cluster_name = Some("c1".to_string());
        let view = ServiceView::build(
            &rec,
            mv::CLUSTER_SUPPORT,
            false,
            Utc::now(),
            Duration::seconds(60),
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["cluster"], "c1");
    }

    #[test]
    fn backend_state_only_for_volume_at_floor() {
        let rec = record(Binary::Scheduler, "host1");
        let view = ServiceView::build(
            &rec,
            mv::BACKEND_STATE_REPORT,
            false,
            Utc::now(),
            Duration::seconds(60),
        );
        assert!(view.backend_state.is_none());

        let rec = record(Binary::Volume, "host1");
        let view = ServiceView::build(
            &rec,
            mv::BACKEND_STATE_REPORT,
            false,
            Utc::now(),
            Duration::seconds(60),
        );
        assert_eq!(view.backend_state.as_deref(), Some("up"));
    }

    #[test]
    fn disabled_reason_validation_rules() {
        let body = ServiceTargetBody {
            disabled_reason: Some("maintenance window".to_string()),
            ..Default::default()
        };
        assert!(body.validate().is_ok());

        let body = ServiceTargetBody {
            disabled_reason: Some("a".repeat(256)),
            ..Default::default()
        };
        assert!(body.validate().is_err());

        let body = ServiceTargetBody {
            disabled_reason: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(body.validate().is_err());

        let body = ServiceTargetBody {
            disabled_reason: Some("a".repeat(255)),
            ..Default::default()
        };
        assert!(body.validate().is_ok());
    }
}
