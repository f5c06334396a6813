//! Inbound content-decoding middleware.
//!
//! Git clients may gzip their request bodies. Downstream handlers and the
//! spawned `git` processes expect plain bytes, so the declared transfer
//! encoding is undone here and the header removed. Anything other than an
//! empty value or `gzip` is a hard failure; the wrapped handler never runs.

use std::io;

use async_compression::tokio::bufread::GzipDecoder;
use axum::body::Body;
use axum::http::{header, Request};
use futures_util::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::error::GatewayError;
use crate::gateway::context::RequestContext;
use crate::gateway::routes::HandleFunc;

/// Wrap a handler with transparent request-body decompression.
pub fn content_encoding(inner: HandleFunc) -> HandleFunc {
    std::sync::Arc::new(move |mut ctx: RequestContext| {
        let inner = inner.clone();
        Box::pin(async move {
            let declared = ctx
                .request
                .headers()
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            match declared.as_str() {
                "" => {
                    ctx.request.headers_mut().remove(header::CONTENT_ENCODING);
                }
                "gzip" => {
                    ctx.request = decompress_gzip(ctx.request);
                }
                other => {
                    return GatewayError::UnsupportedEncoding(other.to_string()).into_response();
                }
            }

            inner(ctx).await
        })
    })
}

/// Replace the request body with a streaming gzip decoder over the original
/// bytes and drop the now-stale encoding declaration.
fn decompress_gzip(request: Request<Body>) -> Request<Body> {
    let (mut parts, body) = request.into_parts();
    parts.headers.remove(header::CONTENT_ENCODING);
    // The decompressed length is unknown until the body has been read.
    parts.headers.remove(header::CONTENT_LENGTH);

    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let decoder = GzipDecoder::new(reader);
    Request::from_parts(parts, Body::from_stream(ReaderStream::new(decoder)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::Response;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn request_with_encoding(encoding: Option<&str>, body: Vec<u8>) -> RequestContext {
        let mut builder = Request::builder().method("POST").uri("/test");
        if let Some(encoding) = encoding {
            builder = builder.header(header::CONTENT_ENCODING, encoding);
        }
        RequestContext::new(builder.body(Body::from(body)).unwrap(), "/test".to_string())
    }

    fn collecting_handler(seen: Arc<AtomicBool>, expected: &'static [u8]) -> HandleFunc {
        Arc::new(move |ctx: RequestContext| {
            let seen = seen.clone();
            Box::pin(async move {
                assert!(
                    ctx.request.headers().get(header::CONTENT_ENCODING).is_none(),
                    "Content-Encoding should be deleted"
                );
                let bytes = axum::body::to_bytes(ctx.request.into_body(), usize::MAX)
                    .await
                    .unwrap();
                assert_eq!(&bytes[..], expected);
                seen.store(true, Ordering::SeqCst);
                Response::default()
            })
        })
    }

    #[tokio::test]
    async fn gzip_body_is_transparently_decoded() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"test").unwrap();
        let compressed = encoder.finish().unwrap();

        let seen = Arc::new(AtomicBool::new(false));
        let handler = content_encoding(collecting_handler(seen.clone(), b"test"));
        let response = handler(request_with_encoding(Some("gzip"), compressed)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn empty_encoding_passes_body_through() {
        let seen = Arc::new(AtomicBool::new(false));
        let handler = content_encoding(collecting_handler(seen.clone(), b"plain"));
        let response = handler(request_with_encoding(Some(""), b"plain".to_vec())).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unsupported_encoding_fails_without_running_handler() {
        let never: HandleFunc = Arc::new(|_ctx| {
            Box::pin(async { panic!("handler must not be invoked") })
        });
        let handler = content_encoding(never);
        let response = handler(request_with_encoding(
            Some("application/unknown"),
            Vec::new(),
        ))
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
