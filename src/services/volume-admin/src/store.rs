//! Service Store Module
//!
//! The persistence collaborator behind the lifecycle controller, as a
//! trait for dependency injection plus the in-memory implementation.
//! Updates are read-then-write with last-write-wins semantics; the store
//! owns whatever concurrency control it needs and the controller assumes
//! nothing stronger.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::models::{Binary, ClusterRecord, HeartbeatRequest, ServiceRecord};
use crate::{AdminError, Result};

/// Store operations the lifecycle controller depends on.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// List services, optionally filtered by host (exact or
    /// before-`@` prefix match) and binary.
    async fn list_services(
        &self,
        host: Option<&str>,
        binary: Option<Binary>,
    ) -> Result<Vec<ServiceRecord>>;

    /// Resolve the unique service for `(host, binary)`. Exact host match
    /// wins; otherwise a single before-`@` prefix match resolves, and an
    /// ambiguous prefix is an error.
    async fn find_service(&self, host: &str, binary: Binary) -> Result<Option<ServiceRecord>>;

    /// Flip the disabled flag of one service. `reason` replaces the
    /// stored reason; `None` clears it.
    async fn set_service_disabled(
        &self,
        host: &str,
        binary: Binary,
        disabled: bool,
        reason: Option<String>,
    ) -> Result<ServiceRecord>;

    /// Flip the frozen flag of one volume service.
    async fn set_service_frozen(
        &self,
        host: &str,
        binary: Binary,
        frozen: bool,
    ) -> Result<ServiceRecord>;

    /// Upsert from a backend heartbeat; creates the record (and its
    /// cluster record, if named) on first report.
    async fn record_heartbeat(&self, req: HeartbeatRequest) -> Result<ServiceRecord>;

    /// List clusters, optionally filtered by name and binary.
    async fn list_clusters(
        &self,
        name: Option<&str>,
        binary: Option<Binary>,
    ) -> Result<Vec<ClusterRecord>>;

    /// Resolve a cluster by `(name, binary)`.
    async fn find_cluster(&self, name: &str, binary: Binary) -> Result<Option<ClusterRecord>>;

    /// Flip the disabled flag of a cluster and cascade it to member
    /// services.
    async fn set_cluster_disabled(
        &self,
        name: &str,
        binary: Binary,
        disabled: bool,
        reason: Option<String>,
    ) -> Result<ClusterRecord>;

    /// Flip the frozen flag of a cluster record.
    async fn set_cluster_frozen(
        &self,
        name: &str,
        binary: Binary,
        frozen: bool,
    ) -> Result<ClusterRecord>;

    /// Member services of a cluster.
    async fn services_in_cluster(&self, name: &str, binary: Binary) -> Result<Vec<ServiceRecord>>;

    /// `(num_hosts, num_down_hosts)` for a cluster's members.
    async fn cluster_host_counts(
        &self,
        name: &str,
        binary: Binary,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<(u32, u32)>;
}

/// In-memory store keyed by `(host, binary)` / `(name, binary)`.
pub struct InMemoryStore {
    services: DashMap<(String, Binary), ServiceRecord>,
    clusters: DashMap<(String, Binary), ClusterRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            clusters: DashMap::new(),
        }
    }

    /// Seed a service record directly, bypassing the heartbeat path.
    pub fn insert_service(&self, record: ServiceRecord) {
        self.services
            .insert((record.host.clone(), record.binary), record);
    }

    /// Seed a cluster record directly.
    pub fn insert_cluster(&self, record: ClusterRecord) {
        self.clusters
            .insert((record.name.clone(), record.binary), record);
    }

    fn ensure_cluster(&self, name: &str, binary: Binary, now: DateTime<Utc>) {
        let key = (name.to_string(), binary);
        let mut entry = self.clusters.entry(key).or_insert_with(|| {
            info!(cluster = name, binary = %binary, "registering cluster");
            ClusterRecord {
                name: name.to_string(),
                binary,
                disabled: false,
                disabled_reason: None,
                frozen: false,
                replication_status: None,
                active_backend_id: None,
                created_at: now,
                updated_at: None,
                modified_at: None,
            }
        });
        entry.updated_at = Some(now);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceStore for InMemoryStore {
    async fn list_services(
        &self,
        host: Option<&str>,
        binary: Option<Binary>,
    ) -> Result<Vec<ServiceRecord>> {
        let mut records: Vec<ServiceRecord> = self
            .services
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|rec| binary.map_or(true, |b| rec.binary == b))
            .filter(|rec| host.map_or(true, |h| rec.matches_host(h)))
            .collect();
        records.sort_by(|a, b| (a.host.as_str(), a.binary.wire_name())
            .cmp(&(b.host.as_str(), b.binary.wire_name())));
        Ok(records)
    }

    async fn find_service(&self, host: &str, binary: Binary) -> Result<Option<ServiceRecord>> {
        if let Some(exact) = self.services.get(&(host.to_string(), binary)) {
            return Ok(Some(exact.value().clone()));
        }

        let mut matches: Vec<ServiceRecord> = self
            .services
            .iter()
            .filter(|entry| entry.value().binary == binary && entry.value().matches_host(host))
            .map(|entry| entry.value().clone())
            .collect();

        match matches.len() {
            0 | 1 => Ok(matches.pop()),
            n => Err(AdminError::InvalidInput(format!(
                "host {host:?} matches {n} services of binary {binary}; use the full host@backend name"
            ))),
        }
    }

    async fn set_service_disabled(
        &self,
        host: &str,
        binary: Binary,
        disabled: bool,
        reason: Option<String>,
    ) -> Result<ServiceRecord> {
        let mut entry = self
            .services
            .get_mut(&(host.to_string(), binary))
            .ok_or_else(|| {
                AdminError::InvalidInput(format!(
                    "no service record for host {host:?} with binary {binary}"
                ))
            })?;

        entry.disabled = disabled;
        entry.disabled_reason = reason;
        entry.modified_at = Some(Utc::now());
        debug!(host, binary = %binary, disabled, "service state updated");
        Ok(entry.value().clone())
    }

    async fn set_service_frozen(
        &self,
        host: &str,
        binary: Binary,
        frozen: bool,
    ) -> Result<ServiceRecord> {
        let mut entry = self
            .services
            .get_mut(&(host.to_string(), binary))
            .ok_or_else(|| {
                AdminError::InvalidInput(format!(
                    "no service record for host {host:?} with binary {binary}"
                ))
            })?;
        entry.frozen = frozen;
        entry.modified_at = Some(Utc::now());
        debug!(host, binary = %binary, frozen, "service freeze state updated");
        Ok(entry.value().clone())
    }

    async fn record_heartbeat(&self, req: HeartbeatRequest) -> Result<ServiceRecord> {
        let now = Utc::now();
        let key = (req.host.clone(), req.binary);

        let mut entry = self.services.entry(key).or_insert_with(|| {
            info!(host = %req.host, binary = %req.binary, "registering service on first heartbeat");
            ServiceRecord {
                binary: req.binary,
                host: req.host.clone(),
                cluster_name: None,
                availability_zone: "nova".to_string(),
                disabled: false,
                disabled_reason: None,
                frozen: false,
                replication_status: None,
                active_backend_id: None,
                created_at: now,
                updated_at: None,
                modified_at: None,
            }
        });

        entry.updated_at = Some(now);
        if let Some(zone) = req.availability_zone {
            entry.availability_zone = zone;
        }
        entry.cluster_name = req.cluster_name.clone();
        if let Some(status) = req.replication_status {
            entry.replication_status = Some(status);
        }
        if let Some(backend_id) = req.active_backend_id {
            entry.active_backend_id = Some(backend_id);
        }
        if let Some(frozen) = req.frozen {
            entry.frozen = frozen;
        }
        let record = entry.value().clone();
        drop(entry);

        if let Some(ref cluster) = record.cluster_name {
            self.ensure_cluster(cluster, record.binary, now);
        }

        Ok(record)
    }

    async fn list_clusters(
        &self,
        name: Option<&str>,
        binary: Option<Binary>,
    ) -> Result<Vec<ClusterRecord>> {
        let mut records: Vec<ClusterRecord> = self
            .clusters
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|rec| binary.map_or(true, |b| rec.binary == b))
            .filter(|rec| name.map_or(true, |n| rec.name == n))
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn find_cluster(&self, name: &str, binary: Binary) -> Result<Option<ClusterRecord>> {
        Ok(self
            .clusters
            .get(&(name.to_string(), binary))
            .map(|entry| entry.value().clone()))
    }

    async fn set_cluster_disabled(
        &self,
        name: &str,
        binary: Binary,
        disabled: bool,
        reason: Option<String>,
    ) -> Result<ClusterRecord> {
        let record = {
            let mut entry = self
                .clusters
                .get_mut(&(name.to_string(), binary))
                .ok_or_else(|| {
                    AdminError::InvalidInput(format!(
                        "no cluster named {name:?} with binary {binary}"
                    ))
                })?;
            entry.disabled = disabled;
            entry.disabled_reason = reason.clone();
            entry.modified_at = Some(Utc::now());
            entry.value().clone()
        };

        // Cascade to member services. Collect keys first so no shard
        // lock is held across the mutation.
        let member_keys: Vec<(String, Binary)> = self
            .services
            .iter()
            .filter(|entry| {
                entry.value().binary == binary
                    && entry.value().cluster_name.as_deref() == Some(name)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for key in member_keys {
            if let Some(mut svc) = self.services.get_mut(&key) {
                svc.disabled = disabled;
                svc.disabled_reason = reason.clone();
                svc.modified_at = Some(Utc::now());
            }
        }

        info!(cluster = name, binary = %binary, disabled, "cluster state updated");
        Ok(record)
    }

    async fn set_cluster_frozen(
        &self,
        name: &str,
        binary: Binary,
        frozen: bool,
    ) -> Result<ClusterRecord> {
        let mut entry = self
            .clusters
            .get_mut(&(name.to_string(), binary))
            .ok_or_else(|| {
                AdminError::InvalidInput(format!(
                    "no cluster named {name:?} with binary {binary}"
                ))
            })?;
        entry.frozen = frozen;
        entry.modified_at = Some(Utc::now());
        Ok(entry.value().clone())
    }

    async fn services_in_cluster(&self, name: &str, binary: Binary) -> Result<Vec<ServiceRecord>> {
        Ok(self
            .services
            .iter()
            .filter(|entry| {
                entry.value().binary == binary
                    && entry.value().cluster_name.as_deref() == Some(name)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn cluster_host_counts(
        &self,
        name: &str,
        binary: Binary,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Result<(u32, u32)> {
        let members = self.services_in_cluster(name, binary).await?;
        let num_hosts = members.len() as u32;
        let num_down = members
            .iter()
            .filter(|rec| !rec.is_up(now, threshold))
            .count() as u32;
        Ok((num_hosts, num_down))
    }
}
