//! Static and precompressed file serving.
//!
//! # Responsibilities
//! - Resolve the request's relative path under a fixed document root
//! - Refuse any resolution that escapes the root (500, not a clamp)
//! - Prefer a `.gz` sibling when the client accepts gzip
//! - Apply the configured cache policy
//! - Fall back to a supplied handler when no file exists

mod deploy;

pub use deploy::handle_deploy_page;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Response as HttpResponse, StatusCode};
use axum::response::Response;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::GatewayError;
use crate::gateway::context::RequestContext;
use crate::gateway::routes::HandleFunc;

/// Cache policy applied to served files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Explicitly forbid caching: no-store triad plus an expired `Expires`.
    Disabled,

    /// Defer to the client's implicit caching semantics.
    Default,
}

/// Set the no-cache header triad used for dynamic or deploy content.
pub fn set_no_cache_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache, no-store, max-age=0, must-revalidate"),
    );
    headers.insert(
        header::PRAGMA,
        header::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        header::EXPIRES,
        header::HeaderValue::from_static("Fri, 01 Jan 1990 00:00:00 GMT"),
    );
}

/// Build a handler serving files under `document_root`.
///
/// When the resolved file is missing or a directory the request falls
/// through to `fallback`, or 404 when none is configured.
pub fn serve_file(
    document_root: PathBuf,
    cache: CacheMode,
    fallback: Option<HandleFunc>,
) -> HandleFunc {
    Arc::new(move |ctx: RequestContext| {
        let document_root = document_root.clone();
        let fallback = fallback.clone();
        Box::pin(async move {
            let file = match resolve_under_root(&document_root, &ctx.relative_path) {
                Ok(file) => file,
                Err(err) => return err.into_response(),
            };

            let accepts_gzip = ctx
                .request
                .headers()
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.contains("gzip"))
                .unwrap_or(false);

            // Serve the precompressed sibling verbatim when the client can
            // take it; the plain file otherwise.
            let mut opened = None;
            let mut encoded = false;
            if accepts_gzip {
                let mut sibling = file.clone().into_os_string();
                sibling.push(".gz");
                if let Ok(found) = open_file(Path::new(&sibling)).await {
                    opened = Some(found);
                    encoded = true;
                }
            }
            let (content, len) = match opened {
                Some(found) => found,
                None => match open_file(&file).await {
                    Ok(found) => found,
                    Err(_) => {
                        return match fallback {
                            Some(fallback) => fallback(ctx).await,
                            None => HttpResponse::builder()
                                .status(StatusCode::NOT_FOUND)
                                .body(Body::from("Not Found"))
                                .unwrap_or_default(),
                        };
                    }
                },
            };

            tracing::info!(
                file = %file.display(),
                method = %ctx.request.method(),
                path = %ctx.request.uri().path(),
                "sending file"
            );

            let mut response = HttpResponse::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, len)
                .body(Body::from_stream(ReaderStream::new(content)))
                .unwrap_or_default();
            if encoded {
                response.headers_mut().insert(
                    header::CONTENT_ENCODING,
                    header::HeaderValue::from_static("gzip"),
                );
            }
            if cache == CacheMode::Disabled {
                set_no_cache_headers(response.headers_mut());
            }
            response
        })
    })
}

/// Join `relative_path` onto `root`, resolving `.`/`..` lexically, and fail
/// if the result leaves the root. This is a security check: escaping paths
/// are rejected outright, never clamped back inside.
fn resolve_under_root(root: &Path, relative_path: &str) -> Result<PathBuf, GatewayError> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(relative_path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if !resolved.starts_with(root) {
        return Err(GatewayError::PathTraversal(resolved));
    }
    Ok(resolved)
}

/// Open a file for serving, rejecting directories.
async fn open_file(path: &Path) -> Result<(File, u64), std::io::Error> {
    let file = File::open(path).await?;
    let metadata = file.metadata().await?;
    if metadata.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("path is directory: {}", path.display()),
        ));
    }
    Ok((file, metadata.len()))
}

/// Read a whole file into a no-cache 200 response, used for the deploy page.
pub(crate) async fn serve_small_file(path: &Path) -> Result<Response, std::io::Error> {
    let data = tokio::fs::read(path).await?;
    let mut response = HttpResponse::builder()
        .status(StatusCode::OK)
        .body(Body::from(data))
        .unwrap_or_default();
    set_no_cache_headers(response.headers_mut());
    Ok(response)
}
