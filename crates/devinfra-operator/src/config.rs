//! Command line and environment configuration

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use devinfra_common::crd::parse_duration;
use devinfra_requirement::ReconcileConfig;

/// devinfra - Requirement reconciler with a content-addressed Operation cache
#[derive(Parser, Debug)]
#[command(name = "devinfra-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print the Requirement, Cache and Operation CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Controller settings
    #[command(flatten)]
    pub controller: ControllerArgs,

    /// Mode to run in
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Operator modes
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the Requirement controller (default mode)
    Controller,
}

/// Settings for the Requirement controller
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Maximum number of Requirements reconciled in parallel
    #[arg(
        long,
        env = "DEVINFRA_WORKERS",
        default_value_t = 4,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub workers: u16,

    /// Deadline for a single reconcile, in seconds
    #[arg(long, env = "DEVINFRA_RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// Pool size for Caches created without sizing hints
    #[arg(long, env = "DEVINFRA_DEFAULT_KEEP_ALIVE_COUNT", default_value_t = 1)]
    pub default_keep_alive_count: u32,

    /// Idle TTL for Caches created without sizing hints (e.g. "30m", "1h30m")
    #[arg(
        long,
        env = "DEVINFRA_DEFAULT_KEEP_ALIVE_DURATION",
        default_value = "30m",
        value_parser = parse_keep_alive
    )]
    pub default_keep_alive_duration: String,

    /// Do not apply CRDs on startup
    #[arg(long, env = "DEVINFRA_SKIP_CRD_INSTALL")]
    pub skip_crd_install: bool,

    /// Only watch this namespace (default: all namespaces)
    #[arg(long, env = "DEVINFRA_NAMESPACE")]
    pub namespace: Option<String>,
}

fn parse_keep_alive(value: &str) -> Result<String, String> {
    parse_duration(value)?;
    Ok(value.to_string())
}

impl ControllerArgs {
    /// Reconciler tunables derived from these flags
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            default_keep_alive_count: self.default_keep_alive_count,
            default_keep_alive_duration: self.default_keep_alive_duration.clone(),
            ..ReconcileConfig::default()
        }
    }
}
