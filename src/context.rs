use std::{collections::BTreeMap, fmt};

use reqwest::{Request, Response, Url, Version};

pub(crate) const PROTOCOL: &str = "protocol";
pub(crate) const HOST: &str = "host";
pub(crate) const PORT: &str = "port";
pub(crate) const REQUEST_URL: &str = "request_url";
pub(crate) const RESPONSE_BODY: &str = "response_body";

/// Diagnostic key/value pairs attached to every error this crate returns.
///
/// Well-known keys have typed accessors; everything is also reachable via
/// [`FailureContext::get`] and [`FailureContext::iter`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FailureContext {
    entries: BTreeMap<String, String>,
}

impl FailureContext {
    /// Identity of the endpoint a request targets.
    pub fn for_request(request: &Request) -> Self {
        Self::for_endpoint(request.version(), request.url())
    }

    /// Identity of the endpoint a response came from.
    pub fn for_response(response: &Response) -> Self {
        Self::for_endpoint(response.version(), response.url())
    }

    pub(crate) fn for_endpoint(version: Version, url: &Url) -> Self {
        let mut context = Self::default();
        context.insert(PROTOCOL, format!("{version:?}"));
        context.insert(HOST, url.host_str().unwrap_or_default());
        context.insert(
            PORT,
            url.port_or_known_default()
                .map(|port| port.to_string())
                .unwrap_or_default(),
        );
        context.insert(REQUEST_URL, request_uri(url));
        context
    }

    pub(crate) fn with_body(mut self, body: &[u8]) -> Self {
        self.insert(RESPONSE_BODY, String::from_utf8_lossy(body));
        self
    }

    pub(crate) fn with_attempt_error(mut self, attempt: usize, message: impl Into<String>) -> Self {
        self.insert(attempt_key(attempt), message);
        self
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// HTTP version of the exchange, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> Option<&str> {
        self.get(PROTOCOL)
    }

    pub fn host(&self) -> Option<&str> {
        self.get(HOST)
    }

    /// Explicit port, or the scheme's default when the URL omits it.
    pub fn port(&self) -> Option<&str> {
        self.get(PORT)
    }

    /// Path and query of the target URL.
    pub fn request_url(&self) -> Option<&str> {
        self.get(REQUEST_URL)
    }

    /// Body text read before the failure (possibly partial or empty).
    pub fn response_body(&self) -> Option<&str> {
        self.get(RESPONSE_BODY)
    }

    /// Error text of a failed earlier attempt (1-indexed).
    pub fn attempt_error(&self, attempt: usize) -> Option<&str> {
        self.get(&attempt_key(attempt))
    }

    /// Errors of earlier attempts, ordered by attempt number.
    pub fn attempt_errors(&self) -> Vec<(usize, &str)> {
        let mut errors: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(key, value)| parse_attempt_key(key).map(|n| (n, value.as_str())))
            .collect();
        errors.sort_by_key(|(attempt, _)| *attempt);
        errors
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, (key, value)) in self.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value:?}")?;
        }
        f.write_str("}")
    }
}

fn attempt_key(attempt: usize) -> String {
    format!("attempt {attempt} err")
}

fn parse_attempt_key(key: &str) -> Option<usize> {
    key.strip_prefix("attempt ")?
        .strip_suffix(" err")?
        .parse()
        .ok()
}

/// Path plus query, the way it appears on an HTTP/1 request line.
fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    }
}
