//! Volume Admin Library
//!
//! StorCore Service and Cluster Lifecycle Administration
//!
//! This library implements the administrative control surface for the
//! StorCore block-storage platform:
//! - Listing backend service processes with derived up/down state
//! - Enable / disable (with audit reason) of services and clusters
//! - Freeze / thaw of scheduling to a backend host or cluster
//! - Replication failover to a secondary backend
//! - Dynamic log-level control fanned out across backend services
//!
//! Every request negotiates an API microversion (see `storcore-shared`);
//! the negotiated version gates which parameters and response fields are
//! reachable. Validation failures are synchronous and never retried; the
//! only externally-caused failures are backend RPC timeouts, which are
//! surfaced distinctly and left to the caller.

use storcore_shared::{ApiVersion, VersionError};
use thiserror::Error;

pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod negotiate;
pub mod rpc;
pub mod store;

// Re-export commonly used types
pub use config::{Args, VolumeAdminConfig};
pub use handlers::{create_router, AppState};
pub use lifecycle::{LifecycleController, LogControl, ServiceAction};
pub use models::{Binary, ClusterRecord, LogLevel, ServiceRecord};
pub use rpc::{BackendRpc, HttpBackendRpc};
pub use store::{InMemoryStore, ServiceStore};

/// Volume admin error taxonomy.
///
/// Every variant maps to exactly one HTTP status in the API boundary:
/// malformed input and failed validation are 400, an out-of-range version
/// header is 406, an operation gated above the negotiated version is 404,
/// unresolved path resources are 404, backend transport failures are
/// 502/504. Unresolved *body* targets (a host or cluster name that does
/// not match any record) are deliberately `InvalidInput`, not `NotFound`:
/// the identity is a request parameter, not an API resource.
#[derive(Error, Debug)]
pub enum AdminError {
    /// Malformed request content, including unresolved body-named targets.
    #[error("Invalid input received: {0}")]
    InvalidInput(String),

    /// A request field failed validation rules.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Version string parsing failed.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// The version header named a version outside the supported range.
    #[error("API version {requested} is not acceptable; supported versions are {min} through {max}")]
    VersionNotAcceptable {
        requested: String,
        min: ApiVersion,
        max: ApiVersion,
    },

    /// The operation exists but not at the negotiated version.
    #[error("{action} is not available at API version {requested}; minimum is {min}")]
    UnsupportedVersion {
        action: String,
        requested: ApiVersion,
        min: ApiVersion,
    },

    /// A path resource does not exist.
    #[error("{0} could not be found")]
    NotFound(String),

    /// The backend RPC transport timed out. Never retried at this layer.
    #[error("RPC to {0} timed out")]
    RpcTimeout(String),

    /// The backend RPC failed for a non-timeout reason.
    #[error("RPC failed: {0}")]
    Rpc(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the volume admin library.
pub type Result<T> = std::result::Result<T, AdminError>;

/// Library version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default server port.
pub const DEFAULT_PORT: u16 = 8776;

/// Default seconds since last heartbeat before a service reports `down`.
pub const DEFAULT_SERVICE_DOWN_TIME: u64 = 60;
