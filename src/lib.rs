#![deny(missing_docs)]

//! Core library for docflow: validate user-authored document-processing graphs and run them as
//! linear partition/chunk pipelines.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Flow graph model, validation, and path resolution.
pub mod flow;
/// Structured logging and tracing setup.
pub mod logging;
/// Flow run counters.
pub mod metrics;
/// Payloads, stage collaborators, and flow execution.
pub mod processing;
