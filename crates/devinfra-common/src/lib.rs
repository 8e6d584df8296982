//! Shared types for the devinfra operator: CRDs, cache keys, conditions,
//! errors and the observability stack.

#![deny(missing_docs)]

pub mod cache_key;
pub mod conditions;
pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod metrics;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result alias for devinfra operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
