//! Pre-authorization round-trip against the backend.
//!
//! Protected routes ask the authorization backend whether the request may
//! proceed before doing any work. The backend answers 200 with a JSON grant,
//! or any other status which we relay verbatim to the client (including
//! headers such as `WWW-Authenticate`).

use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderMap, Method, Request, Uri};
use axum::response::Response;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::error::{fail_500, GatewayError};
use crate::gateway::context::{AuthorizationGrant, RequestContext};
use crate::gateway::routes::HandleFunc;

/// Outcome of one authorization round-trip.
pub enum AuthOutcome {
    /// The backend allowed the request and returned a decoded grant.
    Allowed(AuthorizationGrant),

    /// The backend denied the request; relay its response to the client.
    Denied(Response),
}

/// HTTP client for the authorization backend.
///
/// Stateless beyond configuration; shared read-only across requests.
pub struct AuthClient {
    client: Client<HttpConnector, Body>,
    auth_backend: Url,
}

impl AuthClient {
    pub fn new(auth_backend: Url) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            auth_backend,
        }
    }

    /// Ask the backend to authorize the request, with `suffix` appended to
    /// the request path to select the authorization sub-resource.
    ///
    /// Takes the request line and headers by value; the client's body never
    /// travels, the round-trip always carries an empty one.
    pub async fn authorize(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        suffix: &str,
    ) -> Result<AuthOutcome, GatewayError> {
        let auth_uri = self.auth_uri(&uri, suffix)?;

        let mut auth_request = Request::builder()
            .method(method)
            .uri(auth_uri)
            .body(Body::empty())
            .map_err(|e| GatewayError::Internal(format!("building auth request: {}", e)))?;
        *auth_request.headers_mut() = headers;

        let response = self
            .client
            .request(auth_request)
            .await
            .map_err(|e| GatewayError::Internal(format!("authorization round-trip: {}", e)))?;

        if response.status() != axum::http::StatusCode::OK {
            // The backend said no. Maybe the client needs to send HTTP Basic
            // credentials; its response carries the hint, so pass it on.
            let (parts, body) = response.into_parts();
            return Ok(AuthOutcome::Denied(Response::from_parts(
                parts,
                Body::new(body),
            )));
        }

        let body = axum::body::to_bytes(Body::new(response.into_body()), usize::MAX)
            .await
            .map_err(|e| GatewayError::Internal(format!("reading auth response: {}", e)))?;
        let grant: AuthorizationGrant = serde_json::from_slice(&body)?;
        Ok(AuthOutcome::Allowed(grant))
    }

    fn auth_uri(&self, original: &Uri, suffix: &str) -> Result<Uri, GatewayError> {
        let scheme = match self.auth_backend.scheme() {
            "https" => Scheme::HTTPS,
            _ => Scheme::HTTP,
        };
        let authority: Authority = self
            .auth_backend
            .authority()
            .parse()
            .map_err(|e| GatewayError::Internal(format!("auth backend authority: {}", e)))?;

        let mut path_and_query = format!("{}{}", original.path(), suffix);
        if let Some(query) = original.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| GatewayError::Internal(format!("auth request URI: {}", e)))
    }
}

/// Wrap a handler so it only runs after a successful authorization
/// round-trip. The decoded grant is installed in the request context before
/// the inner handler sees it; a denied or failed round-trip never reaches
/// the handler.
pub fn pre_authorize(auth: Arc<AuthClient>, suffix: &'static str, inner: HandleFunc) -> HandleFunc {
    Arc::new(move |mut ctx: RequestContext| {
        let auth = auth.clone();
        let inner = inner.clone();
        Box::pin(async move {
            // The request line and headers are detached up front so the
            // body-carrying request is never borrowed across the round-trip.
            let method = ctx.request.method().clone();
            let uri = ctx.request.uri().clone();
            let headers = ctx.request.headers().clone();
            match auth.authorize(method, uri, headers, suffix).await {
                Ok(AuthOutcome::Allowed(grant)) => {
                    ctx.grant = grant;
                    inner(ctx).await
                }
                Ok(AuthOutcome::Denied(response)) => response,
                Err(err) => fail_500(&err),
            }
        })
    })
}
