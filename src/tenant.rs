//! Tenant (site) resolution for incoming connections.
//!
//! Everything here is a pure function of the upgrade request headers and the
//! configured default site.

use axum::http::{header, HeaderMap};

const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// The parts of an upgrade request the gatekeeper cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Value of the configured site header
    pub site_header: Option<String>,
    pub host: Option<String>,
    pub origin: Option<String>,
    /// Raw `Cookie` header
    pub cookie: Option<String>,
    /// Raw `Authorization` header
    pub authorization: Option<String>,
}

impl ConnectRequest {
    pub fn from_headers(headers: &HeaderMap, site_header: &str) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        Self {
            site_header: get(site_header),
            host: get(header::HOST.as_str()),
            origin: get(header::ORIGIN.as_str()),
            cookie: get(header::COOKIE.as_str()),
            authorization: get(header::AUTHORIZATION.as_str()),
        }
    }

    /// Session id from the `sid` cookie.
    pub fn sid(&self) -> Option<String> {
        let raw = self.cookie.as_deref()?;
        cookie::Cookie::split_parse(raw)
            .filter_map(Result::ok)
            .find(|c| c.name() == "sid")
            .map(|c| c.value().to_string())
    }

    /// Token of an `Authorization: JWT <token>` or `Bearer <token>` header.
    pub fn auth_token(&self) -> Option<String> {
        let auth = self.authorization.as_deref()?;
        let (scheme, token) = auth.split_once(' ')?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme.contains("jwt") || scheme == "bearer" {
            Some(token.trim().to_string())
        } else {
            None
        }
    }
}

/// Strip scheme, path and port from a URL or host header value.
pub fn hostname(url: &str) -> &str {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let authority = without_scheme.split('/').next().unwrap_or(without_scheme);
    match authority.find(':') {
        Some(idx) => &authority[..idx],
        None => authority,
    }
}

/// Whether a site name is usable as a single directory under the sites path.
pub fn is_valid_site(site: &str) -> bool {
    !site.is_empty()
        && site != "."
        && site != ".."
        && !site.contains(&['/', '\\', '\0'][..])
}

fn site_from(value: Option<&str>) -> Option<String> {
    value
        .map(hostname)
        .filter(|site| is_valid_site(site))
        .map(str::to_string)
}

/// Resolve the site for a connection.
///
/// Precedence: explicit site header, then the default site for loopback
/// hosts, then the origin's hostname, then the host's hostname. Candidates
/// that are not a valid site name are skipped. Returns `None` when nothing
/// usable remains.
pub fn resolve_site(request: &ConnectRequest, default_site: Option<&str>) -> Option<String> {
    if let Some(site) = site_from(request.site_header.as_deref()) {
        return Some(site);
    }

    if let (Some(host), Some(default_site)) = (request.host.as_deref(), default_site) {
        if LOOPBACK_HOSTS.contains(&hostname(host)) && is_valid_site(default_site) {
            return Some(default_site.to_string());
        }
    }

    if let Some(site) = site_from(request.origin.as_deref()) {
        return Some(site);
    }

    site_from(request.host.as_deref())
}

/// Base URL for backend calls made on behalf of this connection.
///
/// When origin and host share a hostname the origin is used as-is;
/// otherwise the host is used with the origin's scheme.
pub fn backend_base(request: &ConnectRequest) -> Option<String> {
    let host = request.host.as_deref()?;
    let origin = request.origin.as_deref().unwrap_or("");

    if !origin.is_empty() && hostname(origin) == hostname(host) {
        return Some(origin.trim_end_matches('/').to_string());
    }

    let scheme = if origin.contains("https") { "https" } else { "http" };
    Some(format!("{}://{}", scheme, host))
}
