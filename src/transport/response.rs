//! Response and cookie models.

use serde::Serialize;

/// A complete response: status line, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Header pairs in send order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Empty response with `status`.
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// `text/plain` response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(body.into().into_bytes())
    }

    /// `application/json` response. Serialization failures yield the minimal 500 response.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .with_header("content-type", "application/json")
                .with_body(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize json response");
                Self::minimal_internal_error()
            }
        }
    }

    /// 404 for paths no route accepted.
    pub fn not_found() -> Self {
        Self::text(404, "not found")
    }

    /// 413 for bodies above `limit` bytes.
    pub fn payload_too_large(limit: usize) -> Self {
        Self::text(413, format!("request body exceeds {limit} bytes"))
    }

    /// Hard-coded last-resort 500. Building it cannot fail.
    pub fn minimal_internal_error() -> Self {
        Self {
            status: 500,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: b"internal server error".to_vec(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// A cookie to set on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// `Path` attribute.
    pub path: Option<String>,
    /// `Max-Age` attribute in seconds.
    pub max_age: Option<u64>,
    /// `HttpOnly` flag.
    pub http_only: bool,
    /// `Secure` flag.
    pub secure: bool,
}

impl Cookie {
    /// Session cookie with no attributes.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            http_only: false,
            secure: false,
        }
    }

    /// Set the `Path` attribute.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the `Max-Age` attribute.
    #[must_use]
    pub const fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Set `HttpOnly`.
    #[must_use]
    pub const fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Set `Secure`.
    #[must_use]
    pub const fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Value of the `Set-Cookie` header for this cookie.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_value() {
        let cookie = Cookie::new("sid", "42").with_path("/").with_max_age(60).http_only().secure();
        assert_eq!(cookie.to_header_value(), "sid=42; Path=/; Max-Age=60; HttpOnly; Secure");
        assert_eq!(Cookie::new("a", "b").to_header_value(), "a=b");
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(201, &serde_json::json!({"id": 5}));
        assert_eq!(response.status, 201);
        assert_eq!(response.body, br#"{"id":5}"#.to_vec());
        assert!(response.headers.contains(&("content-type".into(), "application/json".into())));
    }

    #[test]
    fn test_canned_responses() {
        assert_eq!(Response::not_found().status, 404);
        assert_eq!(Response::payload_too_large(10).status, 413);
        assert_eq!(Response::minimal_internal_error().status, 500);
    }
}
