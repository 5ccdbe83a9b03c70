//! Endpoint classification and per-request context

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Endpoint class used to select rate-limit policy, concurrency capacity
/// and request ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Query,
    Ingest,
    Health,
    #[default]
    Default,
}

impl EndpointClass {
    /// Classify a route path by prefix.
    ///
    /// ```
    /// # use heimdall::EndpointClass;
    /// assert_eq!(EndpointClass::from_route("/query"), EndpointClass::Query);
    /// assert_eq!(EndpointClass::from_route("/ingest/upload"), EndpointClass::Ingest);
    /// assert_eq!(EndpointClass::from_route("/documents"), EndpointClass::Default);
    /// ```
    pub fn from_route(path: &str) -> Self {
        if path.starts_with("/query") {
            EndpointClass::Query
        } else if path.starts_with("/ingest") {
            EndpointClass::Ingest
        } else if path.starts_with("/health") {
            EndpointClass::Health
        } else {
            EndpointClass::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Query => "query",
            EndpointClass::Ingest => "ingest",
            EndpointClass::Health => "health",
            EndpointClass::Default => "default",
        }
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the control plane needs to know about an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Route path, e.g. `/query`. Concurrency pools are keyed on it.
    pub route: String,
    /// Client identity used for rate limiting (usually an address).
    pub client: String,
    pub class: EndpointClass,
}

impl RequestContext {
    /// Build a context, classifying the route by prefix.
    pub fn new(route: impl Into<String>, client: impl Into<String>) -> Self {
        let route = route.into();
        let class = EndpointClass::from_route(&route);
        Self {
            route,
            client: client.into(),
            class,
        }
    }

    /// Override the endpoint class.
    pub fn with_class(mut self, class: EndpointClass) -> Self {
        self.class = class;
        self
    }

    /// Rate-limit subject key for this request.
    pub fn subject_key(&self) -> String {
        format!("rate_limit:{}:{}", self.class, self.client)
    }

    /// Resolve the client address behind proxies.
    ///
    /// Order: first `X-Forwarded-For` entry, `X-Real-IP`, the socket peer,
    /// then `"unknown"`.
    pub fn client_from_headers(
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        peer: Option<IpAddr>,
    ) -> String {
        if let Some(first) = forwarded_for
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return first.to_string();
        }
        if let Some(ip) = real_ip.map(str::trim).filter(|v| !v.is_empty()) {
            return ip.to_string();
        }
        peer.map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
