//! Custom Resource Definitions for devinfra
//!
//! This module contains the three CRDs of the `devinfra.goms.io` group:
//! `Requirement`, `Cache` and `Operation`.

mod cache;
mod operation;
mod requirement;
mod types;

use std::time::Duration;

pub use cache::{Cache, CacheSpec, CacheStatus, CACHE_NAME_PREFIX};
pub use operation::{
    Application, JobTemplate, Operation, OperationPhase, OperationSpec, OperationStatus,
};
pub use requirement::{
    CacheSizing, Requirement, RequirementPhase, RequirementSpec, RequirementStatus,
    REQUIREMENT_FINALIZER,
};
pub use types::{Condition, ConditionStatus};

/// `apiVersion` value for all devinfra CRDs
pub const API_VERSION: &str = "devinfra.goms.io/v1alpha1";

/// Label carrying the cache key on Caches and Operations
pub const CACHE_KEY_LABEL: &str = "devinfra.goms.io/cache-key";

/// Label naming the Requirement an Operation was minted for
pub const REQUIREMENT_LABEL: &str = "devinfra.goms.io/requirement";

/// Maximum length of a DNS label
pub const DNS_LABEL_MAX_LEN: usize = 63;

/// Validate a DNS label (RFC 1123): lowercase alphanumerics and hyphens,
/// starting and ending with an alphanumeric, at most 63 characters.
pub(crate) fn validate_dns_label(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if s.len() > DNS_LABEL_MAX_LEN {
        return Err(format!(
            "name '{}' exceeds {} characters",
            s, DNS_LABEL_MAX_LEN
        ));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(format!(
            "name '{}' must be lowercase alphanumeric with hyphens",
            s
        ));
    }
    if s.starts_with('-') || s.ends_with('-') {
        return Err(format!(
            "name '{}' must start and end with an alphanumeric character",
            s
        ));
    }
    Ok(())
}

/// Parse a Go-style duration string such as `"30m"`, `"1h30m"` or `"90s"`.
///
/// Supported units: `h`, `m`, `s`, `ms`. A bare `"0"` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(format!("invalid duration '{}'", input));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            return Err(format!("invalid duration '{}'", input));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration '{}'", input))?;
        rest = &rest[digits..];

        let unit_len = rest.chars().take_while(|c| c.is_ascii_alphabetic()).count();
        let part = match &rest[..unit_len] {
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "s" => Duration::from_secs(value),
            "ms" => Duration::from_millis(value),
            _ => return Err(format!("invalid duration '{}'", input)),
        };
        total = total.saturating_add(part);
        rest = &rest[unit_len..];
    }
    Ok(total)
}
