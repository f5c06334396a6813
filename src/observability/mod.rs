//! Observability subsystem.
//!
//! Structured logging via `tracing` and request counters/latency via the
//! `metrics` crate with a Prometheus exposition endpoint. Metric updates are
//! cheap atomic operations on the dispatch path.

pub mod logging;
pub mod metrics;
