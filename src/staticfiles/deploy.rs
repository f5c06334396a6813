//! Deploy page interception.
//!
//! During deployments the backend drops an `index.html` into the document
//! root; while it exists every request that reaches this handler gets the
//! page instead of the backend.

use std::path::PathBuf;
use std::sync::Arc;

use crate::gateway::context::RequestContext;
use crate::gateway::routes::HandleFunc;
use crate::staticfiles::serve_small_file;

/// Serve `<document_root>/index.html` if it exists, else run `fallback`.
pub fn handle_deploy_page(document_root: PathBuf, fallback: HandleFunc) -> HandleFunc {
    Arc::new(move |ctx: RequestContext| {
        let deploy_page = document_root.join("index.html");
        let fallback = fallback.clone();
        Box::pin(async move {
            match serve_small_file(&deploy_page).await {
                Ok(response) => response,
                Err(_) => fallback(ctx).await,
            }
        })
    })
}
