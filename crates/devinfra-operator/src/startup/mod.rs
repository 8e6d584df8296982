//! Startup utilities for the devinfra operator

mod crds;

pub use crds::{all_crds, crd_manifests, ensure_crds_installed};
