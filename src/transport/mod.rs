//! Interfaces to the transport server that owns the connection.
//!
//! The scheduler treats the transport as an opaque capability: it reads request
//! metadata, asks for the body to be streamed through an [`IoHandle`], and
//! writes the response when the transport reports it is writable.

pub mod formatter;
pub mod response;

use std::io;

use crate::core::{IoHandle, SchedulerError};

pub use formatter::{DefaultErrorFormatter, ErrorFormatter};
pub use response::{Cookie, Response};

/// Request line, headers, cookies and query parameters of one exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    parameters: Vec<(String, String)>,
}

impl RequestMetadata {
    /// Metadata for `method path` with no headers.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Append a header value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a cookie value.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Append a query parameter value.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    /// Request method, e.g. `GET`.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Distinct header names in arrival order.
    pub fn header_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (name, _) in &self.headers {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.clone());
            }
        }
        names
    }

    /// All values of a header; names compare case-insensitively.
    pub fn header(&self, name: &str) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// All values of a cookie.
    pub fn cookies(&self, name: &str) -> Vec<String> {
        values_of(&self.cookies, name)
    }

    /// Distinct query parameter names in arrival order.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (name, _) in &self.parameters {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// All values of a query parameter.
    pub fn parameter(&self, name: &str) -> Vec<String> {
        values_of(&self.parameters, name)
    }
}

fn values_of(pairs: &[(String, String)], name: &str) -> Vec<String> {
    pairs
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
        .collect()
}

/// One request/response exchange on the transport.
///
/// Implementations must deliver I/O events to the [`IoHandle`] they are given,
/// from any thread, and must keep the connection usable until [`complete`] or
/// [`reject`] is called.
///
/// [`complete`]: Exchange::complete
/// [`reject`]: Exchange::reject
pub trait Exchange: Send {
    /// Request metadata, available for the whole exchange.
    fn metadata(&self) -> &RequestMetadata;

    /// Start streaming the request body. The transport answers with
    /// `DataAvailable`, then `AllDataRead` or `Error`.
    fn read_body(&mut self, io: IoHandle) -> io::Result<()>;

    /// Commit status and headers, then report `WritePossible` when the body may be written.
    fn start_response(&mut self, status: u16, headers: &[(String, String)], io: IoHandle) -> io::Result<()>;

    /// Whether a write would be accepted without blocking.
    fn is_ready(&self) -> bool;

    /// Write part of the response body.
    fn write(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Send a complete response outside the non-blocking protocol. Used for error responses.
    fn send_fallback(&mut self, response: &Response) -> io::Result<()>;

    /// The exchange is over; release the connection.
    fn complete(&mut self);

    /// Refuse the exchange at the connection level.
    fn reject(&mut self, reason: &SchedulerError);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let meta = RequestMetadata::new("POST", "/upload")
            .with_header("Content-Type", "text/plain")
            .with_header("x-tag", "a")
            .with_header("X-Tag", "b");
        assert_eq!(meta.header("content-type"), vec!["text/plain"]);
        assert_eq!(meta.header("X-TAG"), vec!["a", "b"]);
        assert_eq!(meta.header_names(), vec!["Content-Type", "x-tag"]);
    }

    #[test]
    fn test_parameters_and_cookies() {
        let meta = RequestMetadata::new("GET", "/search")
            .with_parameter("q", "rust")
            .with_parameter("q", "tokio")
            .with_parameter("page", "2")
            .with_cookie("session", "abc");
        assert_eq!(meta.parameter_names(), vec!["q", "page"]);
        assert_eq!(meta.parameter("q"), vec!["rust", "tokio"]);
        assert_eq!(meta.cookies("session"), vec!["abc"]);
        assert!(meta.cookies("missing").is_empty());
    }
}
