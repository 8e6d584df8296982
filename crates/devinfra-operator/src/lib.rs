//! devinfra Kubernetes operator: binds Requirements to cached or freshly
//! provisioned Operations

#![deny(missing_docs)]

/// Command line and environment configuration
pub mod config;
/// Controller wiring (watches, concurrency, shutdown)
pub mod controller_runner;
/// Startup utilities (CRD install and manifest generation)
pub mod startup;
