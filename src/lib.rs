//! Git smart-HTTP gateway.
//!
//! Sits between Git clients and the authorization/application backend:
//! routes and pre-authorizes requests, serves static and precompressed
//! assets, stages and verifies LFS uploads, shells out to `git` for the
//! smart-HTTP services, and transparently proxies everything else while
//! translating backend-transport failures into 502.

pub mod config;
pub mod error;
pub mod gateway;
pub mod git;
pub mod http;
pub mod lfs;
pub mod observability;
pub mod process;
pub mod proxy;
pub mod staticfiles;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{AuthorizationGrant, Gateway, RequestContext};
pub use http::HttpServer;
pub use proxy::BackendProxy;
