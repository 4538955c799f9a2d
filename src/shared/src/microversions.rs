//! Microversion Capability Registry
//!
//! Version floors that gate individual capabilities of the volume API.
//! A capability is reachable when the negotiated request version is at or
//! above its floor. Floors only ever grow at the top; published floors are
//! frozen forever.

use crate::api_version::{ApiVersion, VersionSpan};

/// Lowest version any request may negotiate; also the default when no
/// version header is supplied.
pub const BASE_VERSION: ApiVersion = ApiVersion::new(3, 0);

/// Service listings carry the `cluster` field, and enable/disable,
/// freeze and thaw may target a cluster instead of a host.
pub const CLUSTER_SUPPORT: ApiVersion = ApiVersion::new(3, 7);

/// Replication failover may target a cluster (the `failover` action).
pub const REPLICATION_CLUSTER: ApiVersion = ApiVersion::new(3, 26);

/// Dynamic log-level control (`set-log` / `get-log`).
pub const LOG_LEVELS: ApiVersion = ApiVersion::new(3, 32);

/// Volume-service listings report `backend_state`.
pub const BACKEND_STATE_REPORT: ApiVersion = ApiVersion::new(3, 49);

/// Highest version this build understands.
pub const MAX_VERSION: ApiVersion = ApiVersion::new(3, 49);

/// The full span this build accepts on the wire.
pub const SUPPORTED_SPAN: VersionSpan = VersionSpan::new(Some(BASE_VERSION), Some(MAX_VERSION));
