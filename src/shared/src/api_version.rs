//! API Version Value Type
//!
//! Parsing, formatting, comparison and range matching for two-part
//! `major.minor` API version identifiers. An absent version is modeled as
//! `Option<ApiVersion>` at the call site; there is no "null version"
//! object that compares as falsy.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Grammar for version strings: no leading zero in the major component,
/// minor may be `0`, exactly two dot-separated numeric components.
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([1-9]\d*)\.([1-9]\d*|0)$").expect("static version regex"));

/// The major-version epoch this platform serves. `previous_version`
/// refuses version strings outside the epoch.
pub const SUPPORTED_EPOCH: u32 = 3;

/// Errors raised by version parsing and arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The string does not match the `major.minor` grammar.
    #[error("API version string {0:?} is of invalid format; must be MajorNum.MinorNum")]
    InvalidVersionString(String),

    /// Structurally valid input that is not acceptable in context
    /// (wrong component count or wrong epoch for `previous_version`).
    #[error("Invalid input received: {0}")]
    InvalidInput(String),
}

/// An immutable `major.minor` API version.
///
/// Ordering is lexicographic on `(major, minor)`, so `3.9 < 3.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    major: u32,
    minor: u32,
}

impl ApiVersion {
    /// Build a version from its components.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Major component.
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Minor component.
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Whether `self` falls within the inclusive `[min, max]` interval.
    ///
    /// A `None` bound is open on that side; both bounds `None` matches
    /// every version.
    pub fn matches(&self, min: Option<ApiVersion>, max: Option<ApiVersion>) -> bool {
        match (min, max) {
            (None, None) => true,
            (Some(min), None) => min <= *self,
            (None, Some(max)) => *self <= max,
            (Some(min), Some(max)) => min <= *self && *self <= max,
        }
    }
}

impl FromStr for ApiVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| VersionError::InvalidVersionString(s.to_string()))?;
        // Components matched the grammar, so they parse unless they
        // overflow u32; overflow is rejected as an invalid string too.
        let major = caps[1]
            .parse()
            .map_err(|_| VersionError::InvalidVersionString(s.to_string()))?;
        let minor = caps[2]
            .parse()
            .map_err(|_| VersionError::InvalidVersionString(s.to_string()))?;
        Ok(ApiVersion { major, minor })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for ApiVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The `[min, max]` support interval a versioned operation declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionSpan {
    /// Lowest version the operation supports; `None` means no floor.
    pub min: Option<ApiVersion>,
    /// Highest version the operation supports; `None` means no ceiling.
    pub max: Option<ApiVersion>,
    /// Experimental operations only match callers that opted in.
    pub experimental: bool,
}

impl VersionSpan {
    /// A stable span with the given bounds.
    pub const fn new(min: Option<ApiVersion>, max: Option<ApiVersion>) -> Self {
        Self {
            min,
            max,
            experimental: false,
        }
    }

    /// A span open at the top: `[floor, ∞)`.
    pub const fn from_floor(floor: ApiVersion) -> Self {
        Self::new(Some(floor), None)
    }

    /// Mark the span experimental.
    pub const fn experimental(mut self) -> Self {
        self.experimental = true;
        self
    }

    /// Whether `version` is inside this span.
    ///
    /// `experimental_requested` is the caller's opt-in flag; an
    /// experimental span never matches a caller that did not opt in.
    pub fn contains(&self, version: ApiVersion, experimental_requested: bool) -> bool {
        if self.experimental && !experimental_requested {
            return false;
        }
        version.matches(self.min, self.max)
    }
}

/// Compute the version string immediately prior to `version` within the
/// [`SUPPORTED_EPOCH`].
///
/// The minor component is decremented with a clamp at zero: the result of
/// `previous_version("3.0")` is `"3.0"`, not `"2.x"`. The clamp is a
/// deliberate policy for computing "the version just before the lowest
/// supported one" as an exclusive test bound; callers that need a strictly
/// smaller version must special-case minor zero.
pub fn previous_version(version: &str) -> Result<String, VersionError> {
    previous_version_in_epoch(version, SUPPORTED_EPOCH)
}

/// Epoch-parameterized form of [`previous_version`].
///
/// The input is held to the same grammar as [`ApiVersion::from_str`];
/// the two entry points never disagree on what a version string is.
pub fn previous_version_in_epoch(version: &str, epoch: u32) -> Result<String, VersionError> {
    let parsed: ApiVersion = version.parse().map_err(|_| {
        VersionError::InvalidInput(format!(
            "version {version:?} does not match the major.minor grammar"
        ))
    })?;
    if parsed.major != epoch {
        return Err(VersionError::InvalidInput(format!(
            "version {version:?} is outside the supported {epoch}.x epoch"
        )));
    }
    Ok(format!("{}.{}", parsed.major, parsed.minor.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn parse_valid_versions() {
        assert_eq!("3.0".parse::<ApiVersion>().unwrap(), ApiVersion::new(3, 0));
        assert_eq!("3.7".parse::<ApiVersion>().unwrap(), ApiVersion::new(3, 7));
        assert_eq!(
            "10.25".parse::<ApiVersion>().unwrap(),
            ApiVersion::new(10, 25)
        );
    }

    #[test]
    fn parse_rejects_bad_grammar() {
        for bad in ["3", "3.01", "v3.0", "-1.0", "3.0.1", "03.1", "3.", ".5", "3 .0", ""] {
            let err = bad.parse::<ApiVersion>().unwrap_err();
            assert_eq!(err, VersionError::InvalidVersionString(bad.to_string()));
        }
    }

    #[test]
    fn display_round_trip() {
        for s in ["3.0", "3.7", "3.49", "12.103"] {
            let v: ApiVersion = s.parse().unwrap();
            assert_eq!(v.to_string(), s);
        }
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        let v3_9: ApiVersion = "3.9".parse().unwrap();
        let v3_10: ApiVersion = "3.10".parse().unwrap();
        assert!(v3_9 < v3_10);
        assert!(ApiVersion::new(2, 99) < ApiVersion::new(3, 0));
    }

    #[test]
    fn matches_truth_table() {
        let v = ApiVersion::new(3, 7);
        assert!(v.matches(None, None));
        assert!(v.matches(Some(ApiVersion::new(3, 0)), None));
        assert!(v.matches(None, Some(ApiVersion::new(3, 49))));
        assert!(v.matches(Some(ApiVersion::new(3, 7)), Some(ApiVersion::new(3, 7))));
        assert!(!v.matches(Some(ApiVersion::new(3, 8)), None));
        assert!(!v.matches(None, Some(ApiVersion::new(3, 6))));
    }

    #[test]
    fn span_gating() {
        let span = VersionSpan::from_floor(ApiVersion::new(3, 26));
        assert!(span.contains(ApiVersion::new(3, 26), false));
        assert!(span.contains(ApiVersion::new(3, 40), false));
        assert!(!span.contains(ApiVersion::new(3, 25), false));

        let exp = VersionSpan::from_floor(ApiVersion::new(3, 26)).experimental();
        assert!(!exp.contains(ApiVersion::new(3, 30), false));
        assert!(exp.contains(ApiVersion::new(3, 30), true));
    }

    #[test]
    fn previous_version_decrements_minor() {
        assert_eq!(previous_version("3.7").unwrap(), "3.6");
        assert_eq!(previous_version("3.1").unwrap(), "3.0");
    }

    #[test]
    fn previous_version_clamps_at_zero() {
        assert_eq!(previous_version("3.0").unwrap(), "3.0");
    }

    #[test]
    fn previous_version_rejects_wrong_epoch() {
        assert!(matches!(
            previous_version("4.5"),
            Err(VersionError::InvalidInput(_))
        ));
        assert!(matches!(
            previous_version("3"),
            Err(VersionError::InvalidInput(_))
        ));
        assert!(matches!(
            previous_version("3.0.1"),
            Err(VersionError::InvalidInput(_))
        ));
    }

    #[test]
    fn previous_version_holds_the_parse_grammar() {
        for bad in ["03.1", "3.01", "v3.0", "3 .0"] {
            assert!(
                matches!(previous_version(bad), Err(VersionError::InvalidInput(_))),
                "{bad:?} must be rejected"
            );
        }
    }

    #[test]
    fn previous_version_in_other_epoch() {
        assert_eq!(previous_version_in_epoch("4.5", 4).unwrap(), "4.4");
    }

    proptest! {
        #[test]
        fn parse_format_round_trip(major in 1u32..=9999, minor in 0u32..=9999) {
            let s = format!("{major}.{minor}");
            let v: ApiVersion = s.parse().unwrap();
            prop_assert_eq!(v.to_string(), s);
        }

        #[test]
        fn matches_is_reflexive(major in 1u32..=999, minor in 0u32..=999) {
            let v = ApiVersion::new(major, minor);
            prop_assert!(v.matches(Some(v), Some(v)));
        }

        #[test]
        fn ordering_is_total_and_transitive(
            a in (1u32..=50, 0u32..=50),
            b in (1u32..=50, 0u32..=50),
            c in (1u32..=50, 0u32..=50),
        ) {
            let (a, b, c) = (
                ApiVersion::new(a.0, a.1),
                ApiVersion::new(b.0, b.1),
                ApiVersion::new(c.0, c.1),
            );
            // Exactly one of <, ==, > holds pairwise.
            let rels = [(a < b), (a == b), (a > b)];
            prop_assert_eq!(rels.iter().filter(|&&r| r).count(), 1);
            if a <= b && b <= c {
                prop_assert!(a <= c);
            }
        }
    }
}
