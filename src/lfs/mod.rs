//! LFS object uploads.
//!
//! An upload is streamed to a staging file while its SHA-256 digest is
//! computed in the same pass; nothing is buffered in memory. Only after the
//! byte count and digest both match the authorization grant is the request
//! forwarded to the backend, with the staged file named in a header and the
//! body emptied. The staged file exists for exactly the duration of that
//! forwarding call and is removed unconditionally when it returns, so the
//! backend must consume or relocate the bytes within the call.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::GatewayError;
use crate::gateway::authorize::{pre_authorize, AuthClient};
use crate::gateway::context::RequestContext;
use crate::gateway::routes::HandleFunc;
use crate::proxy::BackendProxy;

/// Header naming the staged object file for the backend to consume.
pub const LFS_TMP_HEADER: &str = "X-GitLab-Lfs-Tmp";

/// Authorize stage: run the `/authorize` round-trip, require the grant's
/// staging directory and object id, and make sure the staging directory
/// exists (private to the owner) before the store stage runs.
pub fn lfs_authorize(auth: Arc<AuthClient>, inner: HandleFunc) -> HandleFunc {
    let checked: HandleFunc = Arc::new(move |ctx: RequestContext| {
        let inner = inner.clone();
        Box::pin(async move {
            if ctx.grant.store_lfs_path.is_empty() {
                return GatewayError::MissingGrantField("StoreLFSPath").into_response();
            }
            if ctx.grant.lfs_oid.is_empty() {
                return GatewayError::MissingGrantField("LfsOid").into_response();
            }

            let mut builder = tokio::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o700);
            if let Err(err) = builder.create(&ctx.grant.store_lfs_path).await {
                return GatewayError::from(err).into_response();
            }

            inner(ctx).await
        })
    });
    pre_authorize(auth, "/authorize", checked)
}

/// Store stage: stream the body into a staging file, verify it, then forward
/// the annotated, bodyless request through the proxy.
pub fn store_lfs_object(proxy: Arc<BackendProxy>) -> HandleFunc {
    Arc::new(move |ctx: RequestContext| {
        let proxy = proxy.clone();
        Box::pin(async move {
            match store_and_forward(ctx, &proxy).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            }
        })
    })
}

async fn store_and_forward(
    ctx: RequestContext,
    proxy: &BackendProxy,
) -> Result<Response, GatewayError> {
    let grant = ctx.grant;

    // Named after the object id so a stray file can be attributed; the
    // random suffix keeps concurrent uploads of the same object apart.
    // Dropping the handle removes the file on every exit path.
    let staged = tempfile::Builder::new()
        .prefix(&grant.lfs_oid)
        .tempfile_in(&grant.store_lfs_path)?;
    let mut file = tokio::fs::File::from_std(staged.reopen()?);

    let (mut parts, body) = ctx.request.into_parts();

    let mut hasher = Sha256::new();
    let mut written: i64 = 0;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GatewayError::Internal(format!("reading upload: {}", e)))?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        written += chunk.len() as i64;
    }
    file.flush().await?;
    drop(file);

    if written != grant.lfs_size {
        return Err(GatewayError::SizeMismatch {
            expected: grant.lfs_size,
            actual: written,
        });
    }

    let digest = hex::encode(hasher.finalize());
    if digest != grant.lfs_oid {
        return Err(GatewayError::DigestMismatch {
            expected: grant.lfs_oid,
            actual: digest,
        });
    }

    // Name the staged file for the backend and strip the consumed body.
    let file_name = staged
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| GatewayError::Internal("staged file has no name".to_string()))?
        .to_string();
    parts.headers.insert(
        LFS_TMP_HEADER,
        header::HeaderValue::from_str(&file_name)
            .map_err(|e| GatewayError::Internal(format!("staged file name: {}", e)))?,
    );
    parts.headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from_static("0"),
    );

    let forwarded = Request::from_parts(parts, Body::empty());
    let response = proxy.forward(forwarded).await;

    // The staged file is removed here whether or not the backend succeeded.
    drop(staged);
    Ok(response)
}
