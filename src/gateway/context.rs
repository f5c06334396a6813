//! Per-request state carried from authorization through handler execution.

use axum::body::Body;
use axum::http::Request;
use serde::Deserialize;

/// Metadata returned by the authorization backend for an allowed request.
///
/// All fields default to empty on the wire; a handler that requires a field
/// must check it and fail the request rather than guess a value. The field
/// names mirror the backend's JSON contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationGrant {
    /// Identity the backend attributes the request to. Exported as the
    /// `GL_ID` environment variable so hooks run by spawned Git commands can
    /// see who is pushing or pulling.
    #[serde(rename = "GL_ID", default)]
    pub gl_id: String,

    /// Full path on disk to the Git repository the request is about.
    #[serde(rename = "RepoPath", default)]
    pub repo_path: String,

    /// Where a cached copy of a requested archive should be found or created.
    #[serde(rename = "ArchivePath", default)]
    pub archive_path: String,

    /// Subdirectory prefix for extracted archive contents.
    #[serde(rename = "ArchivePrefix", default)]
    pub archive_prefix: String,

    /// Commit the backend authorized, pinning the ref between its
    /// time-of-check and our time-of-use.
    #[serde(rename = "CommitId", default)]
    pub commit_id: String,

    /// Staging directory for in-flight LFS uploads.
    #[serde(rename = "StoreLFSPath", default)]
    pub store_lfs_path: String,

    /// Content digest of the LFS object being uploaded.
    #[serde(rename = "LfsOid", default)]
    pub lfs_oid: String,

    /// Exact byte length of the LFS object being uploaded.
    #[serde(rename = "LfsSize", default)]
    pub lfs_size: i64,

    /// Directory for miscellaneous temporary files.
    #[serde(rename = "TempPath", default)]
    pub temp_path: String,
}

/// Everything a handler needs to serve one request.
///
/// Built once per request after route matching; for protected routes the
/// grant is filled in by the authorization round-trip before the handler
/// runs. Owned exclusively by the task serving the request.
pub struct RequestContext {
    /// The raw inbound request, body included.
    pub request: Request<Body>,

    /// Authorization metadata; empty until a pre-authorization succeeds.
    pub grant: AuthorizationGrant,

    /// Request path with the configured root prefix stripped and
    /// re-canonicalized. Handlers match and resolve files against this.
    pub relative_path: String,
}

impl RequestContext {
    pub fn new(request: Request<Body>, relative_path: String) -> Self {
        Self {
            request,
            grant: AuthorizationGrant::default(),
            relative_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_decodes_from_backend_json() {
        let grant: AuthorizationGrant = serde_json::from_str(
            r#"{
                "GL_ID": "user-123",
                "RepoPath": "/repos/project.git",
                "StoreLFSPath": "/tmp/lfs",
                "LfsOid": "abc",
                "LfsSize": 42
            }"#,
        )
        .unwrap();
        assert_eq!(grant.gl_id, "user-123");
        assert_eq!(grant.repo_path, "/repos/project.git");
        assert_eq!(grant.lfs_size, 42);
        // Unlisted fields default to empty rather than failing the decode.
        assert_eq!(grant.archive_path, "");
    }

    #[test]
    fn grant_tolerates_empty_object() {
        let grant: AuthorizationGrant = serde_json::from_str("{}").unwrap();
        assert_eq!(grant.lfs_size, 0);
        assert!(grant.gl_id.is_empty());
    }
}
