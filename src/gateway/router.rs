//! Request routing and dispatch.
//!
//! # Responsibilities
//! - Reject connection upgrades (`*` request URI) and CONNECT
//! - Canonicalize the request path and strip the configured root prefix
//! - Walk the route table in declaration order, first match wins
//! - Answer 403 when no route matches (git http-protocol requirement)
//! - Log every response with method, path and final status

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{http_error, GatewayError};
use crate::gateway::authorize::AuthClient;
use crate::gateway::context::RequestContext;
use crate::gateway::routes::{route_table, RouteEntry};
use crate::observability::metrics;
use crate::proxy::BackendProxy;

/// Version tag sent to the backend on every proxied request.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The gateway router: immutable route table plus the root prefix shared by
/// every request. Constructed once, then only read.
pub struct Gateway {
    root_prefix: String,
    routes: Vec<RouteEntry>,
}

impl Gateway {
    /// Build the gateway from configuration: parse the backend URL, derive
    /// the root prefix from its path component, and compile the route table.
    pub fn new(config: &GatewayConfig) -> Result<Arc<Self>, GatewayError> {
        let auth_backend: Url = config
            .backend
            .auth_backend
            .parse()
            .map_err(|e| GatewayError::Internal(format!("invalid auth backend URL: {}", e)))?;

        let root_prefix = normalize_prefix(auth_backend.path());

        let auth = Arc::new(AuthClient::new(auth_backend.clone()));
        let proxy = Arc::new(BackendProxy::new(auth_backend, VERSION));
        let routes = route_table(auth, proxy, config.static_files.document_root.clone());

        Ok(Arc::new(Self::from_parts(root_prefix, routes)))
    }

    /// Assemble a gateway from pre-built parts. Route tables are declared in
    /// priority order; the first matching entry handles the request.
    pub fn from_parts(root_prefix: String, routes: Vec<RouteEntry>) -> Self {
        debug_assert!(root_prefix.ends_with('/'));
        Self {
            root_prefix,
            routes,
        }
    }

    /// Serve one request, logging the outcome.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let response = self.dispatch(request).await;

        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            "request served"
        );
        metrics::record_request(method.as_str(), response.status().as_u16(), start);

        response
    }

    async fn dispatch(&self, request: Request<Body>) -> Response {
        // Drop connection upgrades and CONNECT before touching the path.
        if request.uri().path() == "*" {
            return http_error("Connection upgrade not allowed", StatusCode::BAD_REQUEST);
        }
        if request.method() == Method::CONNECT {
            return http_error("CONNECT not allowed", StatusCode::BAD_REQUEST);
        }

        let uri_path = clean_uri_path(request.uri().path());
        if !uri_path.starts_with(&self.root_prefix)
            && format!("{}/", uri_path) != self.root_prefix
        {
            return http_error(
                &format!("Not found {:?}", uri_path),
                StatusCode::NOT_FOUND,
            );
        }

        // Strip the prefix and re-canonicalize so handlers and matchers see
        // an absolute path rooted at the gateway.
        let relative_path = clean_uri_path(
            uri_path
                .strip_prefix(&self.root_prefix)
                .unwrap_or(&uri_path),
        );

        let entry = self
            .routes
            .iter()
            .find(|entry| entry.matches(request.method(), &relative_path));

        match entry {
            Some(entry) => {
                let ctx = RequestContext::new(request, relative_path);
                (entry.handler)(ctx).await
            }
            // The git http-protocol spec requires 403, not 404, when no
            // service matches.
            None => http_error("Forbidden", StatusCode::FORBIDDEN),
        }
    }
}

/// Return the canonical form of a URI path: always absolute, `.`/`..`
/// segments resolved, a meaningful trailing slash preserved.
pub fn clean_uri_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_string();
    }

    let trailing_slash = p.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut cleaned = String::with_capacity(p.len());
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() {
        cleaned.push('/');
    } else if trailing_slash {
        cleaned.push('/');
    }
    cleaned
}

fn normalize_prefix(path: &str) -> String {
    let mut prefix = clean_uri_path(path);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}
