//! Shared API versioning types for the StorCore Platform
//!
//! This crate holds the microversion negotiation primitives used by every
//! StorCore API service:
//! - [`ApiVersion`]: an immutable `major.minor` version value type with a
//!   total order and a strict parsing grammar
//! - [`VersionSpan`]: the `[min, max]` support interval a versioned
//!   operation declares
//! - [`microversions`]: the registry of version floors that gate
//!   individual capabilities
//!
//! Version gating runs on every request, so [`ApiVersion`] is a `Copy`
//! pair of integers rather than a string: comparing strings would order
//! `"3.9"` after `"3.10"`.

pub mod api_version;
pub mod microversions;

pub use api_version::{
    previous_version, previous_version_in_epoch, ApiVersion, VersionError, VersionSpan,
    SUPPORTED_EPOCH,
};
pub use microversions as mv;
