//! Version Negotiation Module
//!
//! Parses the `StorCore-API-Version` request header, pins every request
//! to one concrete version inside the supported span, and echoes the
//! negotiated version on the response. Handlers receive the result as a
//! request extension and never look at the header themselves.
//!
//! Negotiation rules:
//! - No header pins the request to the base version.
//! - `volume latest` pins to the newest supported version.
//! - A malformed value is a client error; a well-formed value outside
//!   the supported span is not acceptable.

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use storcore_shared::{mv, ApiVersion};

use crate::{AdminError, Result};

/// The version header, on both requests and responses.
pub const VERSION_HEADER: &str = "storcore-api-version";

/// The service type expected in the header value.
pub const SERVICE_TYPE: &str = "volume";

/// The version a request runs at, pinned during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestVersion {
    pub version: ApiVersion,
    /// The caller opted in to experimental spans.
    pub experimental: bool,
}

impl RequestVersion {
    pub const fn base() -> Self {
        Self {
            version: mv::BASE_VERSION,
            experimental: false,
        }
    }
}

/// Negotiate the request version from the headers.
pub fn negotiate(headers: &HeaderMap) -> Result<RequestVersion> {
    let raw = match headers.get(VERSION_HEADER) {
        None => return Ok(RequestVersion::base()),
        Some(value) => value
            .to_str()
            .map_err(|_| AdminError::InvalidInput("version header is not valid text".to_string()))?,
    };

    let (version, experimental) = parse_header_value(raw)?;
    if !mv::SUPPORTED_SPAN.contains(version, experimental) {
        return Err(AdminError::VersionNotAcceptable {
            requested: version.to_string(),
            min: mv::BASE_VERSION,
            max: mv::MAX_VERSION,
        });
    }
    Ok(RequestVersion {
        version,
        experimental,
    })
}

/// Parse `volume X.Y[ experimental]` or `volume latest`.
fn parse_header_value(raw: &str) -> Result<(ApiVersion, bool)> {
    let mut words = raw.split_whitespace();

    match words.next() {
        Some(SERVICE_TYPE) => {}
        _ => {
            return Err(AdminError::InvalidInput(format!(
                "version header must name the {SERVICE_TYPE} service: {raw:?}"
            )))
        }
    }

    let version = match words.next() {
        Some("latest") => mv::MAX_VERSION,
        Some(value) => value.parse::<ApiVersion>()?,
        None => {
            return Err(AdminError::InvalidInput(format!(
                "version header carries no version: {raw:?}"
            )))
        }
    };

    let experimental = match words.next() {
        None => false,
        Some("experimental") => true,
        Some(extra) => {
            return Err(AdminError::InvalidInput(format!(
                "unexpected token {extra:?} in version header"
            )))
        }
    };

    if words.next().is_some() {
        return Err(AdminError::InvalidInput(format!(
            "trailing tokens in version header: {raw:?}"
        )));
    }

    Ok((version, experimental))
}

/// Axum middleware: negotiate before the handler, echo after it.
pub async fn negotiate_version(mut request: Request, next: Next) -> Response {
    let negotiated = match negotiate(request.headers()) {
        Ok(negotiated) => negotiated,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(negotiated);
    let mut response = next.run(request).await;
    apply_version_headers(response.headers_mut(), negotiated.version);
    response
}

/// Stamp the negotiated version and the vary hint onto a response.
pub fn apply_version_headers(headers: &mut HeaderMap, version: ApiVersion) {
    if let Ok(value) = HeaderValue::from_str(&format!("{SERVICE_TYPE} {version}")) {
        headers.insert(VERSION_HEADER, value);
    }
    headers.insert(header::VARY, HeaderValue::from_static("StorCore-API-Version"));
}
