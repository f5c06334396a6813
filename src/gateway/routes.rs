//! Route table construction and path matching.
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in the hot path (suffix matching plus a dedicated LFS
//!   object-path validator)
//! - Deterministic: declaration order decides, first match wins

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::gateway::authorize::{pre_authorize, AuthClient};
use crate::gateway::context::RequestContext;
use crate::gateway::encoding::content_encoding;
use crate::git;
use crate::lfs;
use crate::proxy::BackendProxy;
use crate::staticfiles::{handle_deploy_page, serve_file, CacheMode};

/// A request handler stored in the route table.
pub type HandleFunc =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Response> + Send + Sync>;

/// Path condition for a route entry.
#[derive(Debug, Clone, Copy)]
pub enum PathMatch {
    /// The relative path ends with this suffix.
    Suffix(&'static str),

    /// The relative path ends with `gitlab-lfs/objects/<64 hex>/<digits>`.
    LfsObject,
}

impl PathMatch {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Suffix(suffix) => path.ends_with(suffix),
            PathMatch::LfsObject => match path.rfind("/gitlab-lfs/objects/") {
                Some(idx) => {
                    let tail = &path[idx + "/gitlab-lfs/objects/".len()..];
                    match tail.split_once('/') {
                        Some((oid, size)) => {
                            oid.len() == 64
                                && oid.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
                                && !size.is_empty()
                                && size.bytes().all(|b| b.is_ascii_digit())
                        }
                        None => false,
                    }
                }
                None => false,
            },
        }
    }
}

/// One entry in the ordered route table.
///
/// A `None` method or pattern matches any request.
pub struct RouteEntry {
    pub method: Option<Method>,
    pub pattern: Option<PathMatch>,
    pub handler: HandleFunc,
}

impl RouteEntry {
    pub fn new(method: Option<Method>, pattern: Option<PathMatch>, handler: HandleFunc) -> Self {
        Self {
            method,
            pattern,
            handler,
        }
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if let Some(expected) = &self.method {
            if method != expected {
                return false;
            }
        }
        match &self.pattern {
            Some(pattern) => pattern.matches(path),
            None => true,
        }
    }
}

/// Build the fixed route table consulted on every request.
///
/// Git RPC routes pre-authorize against the backend before touching the
/// repository; the LFS route authorizes against the `/authorize` sub-resource.
/// Everything else tries static assets, then the deploy page, then falls
/// through to the proxied backend.
pub fn route_table(
    auth: Arc<AuthClient>,
    proxy: Arc<BackendProxy>,
    document_root: PathBuf,
) -> Vec<RouteEntry> {
    let proxy_backend = proxy_handler(proxy.clone());

    vec![
        RouteEntry::new(
            Some(Method::GET),
            Some(PathMatch::Suffix("/info/refs")),
            pre_authorize(auth.clone(), "", git::get_info_refs()),
        ),
        RouteEntry::new(
            Some(Method::POST),
            Some(PathMatch::Suffix("/git-upload-pack")),
            pre_authorize(auth.clone(), "", content_encoding(git::post_rpc())),
        ),
        RouteEntry::new(
            Some(Method::POST),
            Some(PathMatch::Suffix("/git-receive-pack")),
            pre_authorize(auth.clone(), "", content_encoding(git::post_rpc())),
        ),
        RouteEntry::new(
            Some(Method::PUT),
            Some(PathMatch::LfsObject),
            lfs::lfs_authorize(auth, lfs::store_lfs_object(proxy)),
        ),
        RouteEntry::new(
            None,
            None,
            serve_file(
                document_root.clone(),
                CacheMode::Disabled,
                Some(handle_deploy_page(document_root, proxy_backend)),
            ),
        ),
    ]
}

/// Terminal handler: hand the request to the backend proxy.
pub fn proxy_handler(proxy: Arc<BackendProxy>) -> HandleFunc {
    Arc::new(move |ctx: RequestContext| {
        let proxy = proxy.clone();
        Box::pin(async move { proxy.forward(ctx.request).await })
    })
}
