//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, catch-all route)
//!     → gateway::Gateway::handle (routing, authorization, dispatch)
//!     → response to client
//! ```

pub mod server;

pub use server::HttpServer;
