//! Git smart-HTTP request handlers.
//!
//! The gateway does not speak the pack protocol itself; it frames the
//! ref advertisement and shells out to `git upload-pack` / `git
//! receive-pack` through the process-group supervisor for everything else.

use std::process::Stdio;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Response as HttpResponse, StatusCode};
use futures_util::TryStreamExt;
use tokio::io::AsyncReadExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::error::{fail_500, http_error, GatewayError};
use crate::gateway::context::RequestContext;
use crate::gateway::routes::HandleFunc;
use crate::process::GitCommand;
use crate::staticfiles::set_no_cache_headers;

/// `git-upload-pack` → `upload-pack`, `git-receive-pack` → `receive-pack`.
fn sub_command(rpc: &str) -> &str {
    rpc.strip_prefix("git-").unwrap_or(rpc)
}

/// Frame one pkt-line: four hex length digits followed by the payload.
fn pkt_line(data: &str) -> String {
    format!("{:04x}{}", data.len() + 4, data)
}

const PKT_FLUSH: &str = "0000";

fn rpc_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "service")
        .map(|(_, value)| value.into_owned())
}

/// `GET …/info/refs?service=` — advertise refs for fetch or push.
///
/// Only the smart services are supported; anything else (including the dumb
/// protocol's bare `info/refs`) is 404.
pub fn get_info_refs() -> HandleFunc {
    Arc::new(|ctx: RequestContext| {
        Box::pin(async move {
            let rpc = match rpc_from_query(ctx.request.uri().query()) {
                Some(rpc) if rpc == "git-upload-pack" || rpc == "git-receive-pack" => rpc,
                _ => return http_error("Not Found", StatusCode::NOT_FOUND),
            };

            let mut cmd = match GitCommand::spawn(
                &ctx.grant.gl_id,
                "git",
                &[sub_command(&rpc), "--advertise-refs", &ctx.grant.repo_path],
                Stdio::null(),
                Stdio::piped(),
            ) {
                Ok(cmd) => cmd,
                Err(err) => return GatewayError::from(err).into_response(),
            };

            // Advertisements are small; read them whole, then reap.
            let mut advertisement = Vec::new();
            if let Some(mut stdout) = cmd.take_stdout() {
                if let Err(err) = stdout.read_to_end(&mut advertisement).await {
                    cmd.terminate().await;
                    return GatewayError::from(err).into_response();
                }
            }
            // Terminate on every path, success included, so background
            // descendants of the command cannot outlive the request.
            let status = cmd.wait().await;
            cmd.terminate().await;
            match status {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    return fail_500(&format!("git {}: {}", sub_command(&rpc), status));
                }
                Err(err) => return GatewayError::from(err).into_response(),
            }

            let mut body = pkt_line(&format!("# service={}\n", rpc)).into_bytes();
            body.extend_from_slice(PKT_FLUSH.as_bytes());
            body.extend_from_slice(&advertisement);

            let mut response = HttpResponse::builder()
                .status(StatusCode::OK)
                .header(
                    header::CONTENT_TYPE,
                    format!("application/x-{}-advertisement", rpc),
                )
                .body(Body::from(body))
                .unwrap_or_default();
            set_no_cache_headers(response.headers_mut());
            response
        })
    })
}

/// `POST …/git-upload-pack` / `…/git-receive-pack` — stateless RPC.
///
/// The (already decoded) client body is piped to the subprocess; its stdout
/// streams back as the response body. The group is terminated and reaped
/// once the output is drained, whether or not the client stayed connected.
pub fn post_rpc() -> HandleFunc {
    Arc::new(|ctx: RequestContext| {
        Box::pin(async move {
            let rpc = ctx
                .relative_path
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();

            let mut cmd = match GitCommand::spawn(
                &ctx.grant.gl_id,
                "git",
                &[sub_command(&rpc), "--stateless-rpc", &ctx.grant.repo_path],
                Stdio::piped(),
                Stdio::piped(),
            ) {
                Ok(cmd) => cmd,
                Err(err) => return GatewayError::from(err).into_response(),
            };

            // Feed the full request to the subprocess before reading its
            // answer; stateless RPC is strictly request-then-response.
            if let Some(mut stdin) = cmd.take_stdin() {
                let mut body_reader = StreamReader::new(
                    ctx.request
                        .into_body()
                        .into_data_stream()
                        .map_err(std::io::Error::other),
                );
                if let Err(err) = tokio::io::copy(&mut body_reader, &mut stdin).await {
                    cmd.terminate().await;
                    return GatewayError::from(err).into_response();
                }
            }

            let stdout = match cmd.take_stdout() {
                Some(stdout) => stdout,
                None => {
                    cmd.terminate().await;
                    return GatewayError::Internal("git rpc: no stdout pipe".to_string())
                        .into_response();
                }
            };

            // Stream the subprocess output to the client from a task that
            // owns the child, so the group is always reaped at EOF or on
            // client disconnect.
            let (tx, rx) = tokio::sync::mpsc::channel::<std::io::Result<axum::body::Bytes>>(8);
            tokio::spawn(async move {
                let mut stream = ReaderStream::new(stdout);
                use futures_util::StreamExt;
                while let Some(item) = stream.next().await {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
                cmd.terminate().await;
            });

            let mut response = HttpResponse::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, format!("application/x-{}-result", rpc))
                .body(Body::from_stream(ReceiverStream::new(rx)))
                .unwrap_or_default();
            set_no_cache_headers(response.headers_mut());
            response
        })
    })
}
