//! Backend proxy with transport-failure translation.
//!
//! # Responsibilities
//! - Forward authorized requests to the backend application
//! - Tag every proxied request with the gateway version header
//! - Translate transport-level failures into 502, not 500
//!
//! A connection-refused or timed-out backend is an outage, and users and
//! administrators expect to see 502 for it. Letting the error propagate
//! would surface as a generic 500 and hide the outage behind what looks
//! like an application bug. The translation happens exactly once per
//! attempt; there is no retry.

use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, Request, StatusCode, Uri};
use axum::response::Response;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::error::fail_500;

/// Header carrying the gateway version on every proxied request.
pub const VERSION_HEADER: &str = "Gitlab-Workhorse";

/// Forwards requests to the backend application.
///
/// Stateless beyond configuration; safe for concurrent use.
pub struct BackendProxy {
    client: Client<HttpConnector, Body>,
    scheme: Scheme,
    authority: String,
    version: String,
}

impl BackendProxy {
    pub fn new(backend: Url, version: &str) -> Self {
        let scheme = match backend.scheme() {
            "https" => Scheme::HTTPS,
            _ => Scheme::HTTP,
        };
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            scheme,
            authority: backend.authority().to_string(),
            version: version.to_string(),
        }
    }

    /// Forward the request to the backend, preserving its path and query.
    ///
    /// Headers are cloned before the version tag is added, so the caller's
    /// header map is never mutated. A transport failure becomes a synthetic
    /// 502 with the failure description as a plain-text body.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();

        let authority: Authority = match self.authority.parse() {
            Ok(authority) => authority,
            Err(e) => return fail_500(&format!("backend authority: {}", e)),
        };
        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.scheme = Some(self.scheme.clone());
        uri_parts.authority = Some(authority);
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = parts.uri.path_and_query().cloned();
        }
        let uri = match Uri::from_parts(uri_parts) {
            Ok(uri) => uri,
            Err(e) => return fail_500(&format!("backend URI: {}", e)),
        };

        let mut headers = parts.headers.clone();
        match header::HeaderValue::from_str(&self.version) {
            Ok(value) => {
                headers.insert(VERSION_HEADER, value);
            }
            Err(e) => return fail_500(&format!("version header: {}", e)),
        }

        let mut backend_request = match Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .version(parts.version)
            .body(body)
        {
            Ok(request) => request,
            Err(e) => return fail_500(&format!("building backend request: {}", e)),
        };
        *backend_request.headers_mut() = headers;

        match self.client.request(backend_request).await {
            Ok(response) => {
                let (parts, body) = response.into_parts();
                Response::from_parts(parts, Body::new(body))
            }
            Err(e) => {
                tracing::error!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    error = %e,
                    "backend unreachable"
                );
                Response::builder()
                    .status(StatusCode::BAD_GATEWAY)
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from(e.to_string()))
                    .unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_failure_becomes_502_with_description() {
        // Nothing listens on a reserved port of the discard range.
        let proxy = BackendProxy::new("http://127.0.0.1:9".parse().unwrap(), "test-version");
        let request = Request::builder()
            .method("GET")
            .uri("/some/path")
            .body(Body::empty())
            .unwrap();

        let response = proxy.forward(request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!body.is_empty(), "502 body should describe the failure");
    }
}
