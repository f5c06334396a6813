//! Gateway routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → router.rs (reject upgrades/CONNECT, clean path, strip root prefix)
//!     → routes.rs (ordered table, first match wins, 403 on no match)
//!     → authorize.rs (grant round-trip for protected routes)
//!     → encoding.rs (inbound body decompression where declared)
//!     → handler (static files, LFS store, git RPC, or backend proxy)
//! ```
//!
//! The route table and root prefix are built once at startup and never
//! mutated; concurrent requests share them read-only.

pub mod authorize;
pub mod context;
pub mod encoding;
pub mod router;
pub mod routes;

pub use authorize::{pre_authorize, AuthClient, AuthOutcome};
pub use context::{AuthorizationGrant, RequestContext};
pub use encoding::content_encoding;
pub use router::{clean_uri_path, Gateway, VERSION};
pub use routes::{HandleFunc, PathMatch, RouteEntry};
