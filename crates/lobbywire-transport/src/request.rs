//! The HTTP upgrade request a connection was opened with.

/// What the client asked for when it opened the socket.
///
/// Captured once during the handshake and kept for the connection's
/// lifetime, so authenticators and routers can inspect it later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request path, e.g. `/lobby`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Header names (lowercase) and values, in arrival order.
    pub headers: Vec<(String, String)>,
}

impl UpgradeRequest {
    /// Creates a request for `path` with no query or headers.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Sets the raw query string.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Appends a header. The name is lowercased.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Self {
        self.headers
            .push((name.as_ref().to_ascii_lowercase(), value.into()));
        self
    }

    /// Returns the first value of query parameter `key`.
    ///
    /// Values are taken verbatim; no percent-decoding is applied.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then_some(v)
        })
    }

    /// Returns the first value of header `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
