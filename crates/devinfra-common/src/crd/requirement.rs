//! Requirement CRD types
//!
//! A `Requirement` is user intent: "give me an Operation built from this
//! template", optionally satisfied from a warm Cache pool.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::operation::OperationSpec;
use super::parse_duration;
use super::types::Condition;
use crate::Error;

/// Finalizer attached on first reconcile and removed after deletion cleanup
pub const REQUIREMENT_FINALIZER: &str = "finalizer.requirement.devinfra.goms.io";

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a Requirement
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RequirementPhase {
    /// Just admitted, not yet initialized
    #[default]
    #[serde(rename = "")]
    Initial,
    /// Looking up or waiting on the Cache pool
    CacheChecking,
    /// An Operation is bound (or being created) and is not Ready yet
    Operating,
    /// The bound Operation reports Ready
    Ready,
    /// Deletion requested, cleanup in progress
    Deleting,
    /// Cleanup done, finalizer released
    Deleted,
}

impl std::fmt::Display for RequirementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, ""),
            Self::CacheChecking => write!(f, "CacheChecking"),
            Self::Operating => write!(f, "Operating"),
            Self::Ready => write!(f, "Ready"),
            Self::Deleting => write!(f, "Deleting"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

// =============================================================================
// Spec
// =============================================================================

/// Sizing hints forwarded to the Cache when this Requirement creates it
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheSizing {
    /// Target pool size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_count: Option<u32>,

    /// Idle TTL for each warm entry (Go-style duration, e.g. "30m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_duration: Option<String>,
}

/// User intent for a provisioned Operation
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "devinfra.goms.io",
    version = "v1alpha1",
    kind = "Requirement",
    plural = "requirements",
    shortname = "req",
    namespaced,
    status = "RequirementStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Operation","type":"string","jsonPath":".status.operationName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RequirementSpec {
    /// Template of the Operation this Requirement needs
    pub template: OperationSpec,

    /// Try to satisfy the Requirement from a Cache pool
    #[serde(default)]
    pub enable_cache: bool,

    /// Sizing hints for the Cache created on first use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_spec: Option<CacheSizing>,
}

impl RequirementSpec {
    /// Validate the spec; errors are permanent until the user edits it
    pub fn validate(&self) -> Result<(), Error> {
        self.template.validate()?;
        if let Some(duration) = self
            .cache_spec
            .as_ref()
            .and_then(|c| c.keep_alive_duration.as_deref())
        {
            parse_duration(duration).map_err(|msg| {
                Error::validation_for_field("spec.cacheSpec.keepAliveDuration", msg)
            })?;
        }
        Ok(())
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status of a Requirement, written only by the Requirement reconciler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequirementStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RequirementPhase,

    /// Content hash of `spec.template`, set once when caching is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,

    /// Operation currently satisfying this Requirement. Serialized as `null`
    /// when unbound so a status merge patch clears it.
    #[serde(default)]
    pub operation_name: Option<String>,

    /// Typed assertions about progress, unique by type
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Generation last processed by the reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Requirement {
    /// Current phase, `Initial` when no status has been written yet
    pub fn phase(&self) -> RequirementPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// True once a deletion timestamp has been set
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// True if the finalizer is present
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|s| s == REQUIREMENT_FINALIZER))
    }
}
