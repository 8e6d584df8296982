//! Requirement controller for the devinfra operator
//!
//! Binds each Requirement to a Ready Operation, either by claiming a warm
//! one from the matching Cache pool or by provisioning its own, and hands
//! claimed Operations back to the pool when the Requirement is deleted.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod pool;
pub mod watch;

pub use client::{KubeRequirementClient, RequirementClient};
pub use controller::{error_policy, reconcile, Context, ContextBuilder, ReconcileConfig};
