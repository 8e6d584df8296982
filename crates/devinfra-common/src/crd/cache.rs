//! Cache CRD types
//!
//! A `Cache` is a warm pool of Operations built from one template. Its name
//! is derived from the template's cache key, so every Requirement with a
//! structurally identical template lands on the same Cache.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::operation::OperationSpec;

/// Prefix of every Cache name; the rest is the cache key
pub const CACHE_NAME_PREFIX: &str = "cache-";

/// Warm pool of prebuilt Operations for a single template
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "devinfra.goms.io",
    version = "v1alpha1",
    kind = "Cache",
    plural = "caches",
    namespaced,
    status = "CacheStatus",
    printcolumn = r#"{"name":"Key","type":"string","jsonPath":".status.cacheKey"}"#,
    printcolumn = r#"{"name":"KeepAlive","type":"integer","jsonPath":".spec.keepAliveCount"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpec {
    /// Template every pooled Operation is built from
    pub template: OperationSpec,

    /// Target number of warm Operations
    pub keep_alive_count: u32,

    /// Idle TTL for each warm entry (Go-style duration, e.g. "30m")
    pub keep_alive_duration: String,
}

/// Status of a Cache, owned by the Cache controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    /// Echo of the key this Cache serves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,

    /// Current pool size
    #[serde(default)]
    pub keep_alive_count: u32,

    /// Names of the Operations currently in the pool
    #[serde(default)]
    pub operations: Vec<String>,
}

impl Cache {
    /// Deterministic Cache name for a cache key
    pub fn name_for_key(key: &str) -> String {
        format!("{CACHE_NAME_PREFIX}{key}")
    }

    /// Operation names currently listed in the pool
    pub fn pooled_operations(&self) -> &[String] {
        self.status
            .as_ref()
            .map(|s| s.operations.as_slice())
            .unwrap_or_default()
    }
}
