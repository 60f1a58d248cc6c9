//! Connection targets.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Uri};

use crate::Error;

/// The two recognized WebSocket schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `ws`: plain TCP.
    Plain,

    /// `wss`: TLS over TCP.
    Encrypted,
}

impl Scheme {
    /// The scheme as it appears in a URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Plain => "ws",
            Scheme::Encrypted => "wss",
        }
    }

    /// The port used when a URL does not carry one.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Plain => 80,
            Scheme::Encrypted => 443,
        }
    }

    /// Whether connections using this scheme negotiate TLS.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Scheme::Encrypted)
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ws") {
            Ok(Scheme::Plain)
        } else if s.eq_ignore_ascii_case("wss") {
            Ok(Scheme::Encrypted)
        } else {
            Err(Error::InvalidScheme(s.to_owned()))
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The endpoint of a connection attempt.
///
/// The scheme is kept as given and checked when the attempt starts, so an
/// unrecognized scheme fails the attempt rather than the construction.
#[derive(Debug, Clone)]
pub struct Target {
    scheme: String,
    host: String,
    port: u16,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
}

impl Target {
    /// Target `host:port` using `scheme`, with the root path and no extra headers.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            path: "/".into(),
            query: None,
            headers: HeaderMap::new(),
        }
    }

    /// Parse a `ws://` or `wss://` URL.
    pub fn from_url(url: &str) -> Result<Self, Error> {
        let uri: Uri = url
            .parse()
            .map_err(|error: http::uri::InvalidUri| Error::InvalidUrl(error.to_string()))?;

        let scheme: Scheme = uri
            .scheme_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing scheme")))?
            .parse()?;

        let host = uri
            .host()
            .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing host")))?
            .trim_start_matches('[')
            .trim_end_matches(']');

        let port = uri.port_u16().unwrap_or_else(|| scheme.default_port());

        let mut target = Target::new(scheme.as_str(), host, port);
        if let Some(pq) = uri.path_and_query() {
            target.path = if pq.path().is_empty() {
                "/".into()
            } else {
                pq.path().into()
            };
            target.query = pq.query().map(String::from);
        }

        Ok(target)
    }

    /// Set the request path. Defaults to `/`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the request query, without the leading `?`.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Replace the extra request headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append one extra request header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// The scheme, as given.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request query.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Extra request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the host is an IP literal rather than a name.
    pub fn is_ip_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// The request target in origin form, `/path?query`.
    pub(crate) fn origin_form(&self) -> Result<Uri, Error> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        let pq = match &self.query {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };

        pq.parse()
            .map_err(|error: http::uri::InvalidUri| Error::InvalidUrl(error.to_string()))
    }

    /// The `Host` header value, carrying the port when it is not the default one.
    pub(crate) fn authority(&self, scheme: Scheme) -> String {
        let host = if self.host.parse::<std::net::Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        if self.port == scheme.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}
