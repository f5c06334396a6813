//! Error taxonomy for the gateway.
//!
//! Every variant maps to exactly one client-visible status code. Clients only
//! ever see a generic message; the underlying cause is logged once at the
//! point where the error response is built.

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use thiserror::Error;

/// Errors that can occur while routing, authorizing or serving a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A handler required a grant field the authorization backend left empty.
    #[error("missing required authorization grant field: {0}")]
    MissingGrantField(&'static str),

    /// A resolved filesystem path escaped the configured root.
    #[error("path {0:?} escapes the configured root")]
    PathTraversal(PathBuf),

    /// The client declared a transfer encoding we do not decode.
    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    /// An uploaded object was shorter or longer than the grant declared.
    #[error("expected object size {expected}, wrote {actual}")]
    SizeMismatch { expected: i64, actual: i64 },

    /// An uploaded object's digest did not match the grant's object id.
    #[error("expected sha256 {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// The authorization backend answered 200 with an undecodable body.
    #[error("failed to decode authorization response: {0}")]
    GrantDecode(#[from] serde_json::Error),

    /// File or subprocess I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for internal plumbing failures (request rebuilds etc.).
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Log the error and render the generic 500 response.
    ///
    /// All taxonomy variants handled here are internal errors by contract;
    /// routing and upstream failures build their responses elsewhere
    /// (`http_error`, the proxy's 502 translation).
    pub fn into_response(self) -> Response {
        fail_500(&self)
    }
}

/// Render an "Internal server error" response, logging the cause once.
pub fn fail_500(err: &dyn std::fmt::Display) -> Response {
    tracing::error!(error = %err, "internal error");
    plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Render a client error, forcing the connection closed.
pub fn http_error(message: &str, status: StatusCode) -> Response {
    let mut response = plain_response(status, message);
    // Force the client to disconnect after a request-level error.
    response
        .headers_mut()
        .insert(header::CONNECTION, header::HeaderValue::from_static("close"));
    response
}

fn plain_response(status: StatusCode, message: &str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(message.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_closes_connection() {
        let response = http_error("Forbidden", StatusCode::FORBIDDEN);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = GatewayError::PathTraversal(PathBuf::from("/etc/passwd"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
