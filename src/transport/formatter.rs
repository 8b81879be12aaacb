//! Rendering of responses for unexpected failures.

use serde::Serialize;

use super::{RequestMetadata, Response};

/// Renders the response sent when a request fails internally.
pub trait ErrorFormatter: Send + Sync {
    /// Build an internal-error response for the request described by `meta`.
    fn format(&self, meta: &RequestMetadata) -> Response;
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    method: &'a str,
    path: &'a str,
}

/// 500 with a small JSON body naming the failed request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorFormatter;

impl ErrorFormatter for DefaultErrorFormatter {
    fn format(&self, meta: &RequestMetadata) -> Response {
        Response::json(
            500,
            &ErrorBody {
                error: "internal server error",
                method: meta.method(),
                path: meta.path(),
            },
        )
    }
}
