//! Operation CRD types
//!
//! An `Operation` is a concrete unit of work: a list of Applications, each
//! with a provision job and an optional teardown job. The Operation
//! controller drives the jobs; this crate only describes the shape other
//! controllers read and write.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::validate_dns_label;
use crate::Error;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of an Operation, as reported by the Operation controller
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum OperationPhase {
    /// Accepted, jobs not started
    #[default]
    Pending,
    /// Provision jobs are running
    Provisioning,
    /// All provision jobs completed
    Ready,
    /// Teardown jobs are running
    TearingDown,
    /// Teardown finished
    Deleted,
}

impl std::fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Ready => write!(f, "Ready"),
            Self::TearingDown => write!(f, "TearingDown"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

// =============================================================================
// Job templates
// =============================================================================

/// Container job run for one side of an Application's lifecycle
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplate {
    /// Container image
    pub image: String,

    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Arguments passed to the entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Retries before the job is marked failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,

    /// Wall-clock limit for the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<i64>,
}

/// One application inside an Operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Application name, unique within the Operation
    pub name: String,

    /// Job that brings the application up
    pub provision: JobTemplate,

    /// Job that tears the application down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<JobTemplate>,
}

// =============================================================================
// CRD
// =============================================================================

/// A provisioned unit of work made of Applications
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "devinfra.goms.io",
    version = "v1alpha1",
    kind = "Operation",
    plural = "operations",
    shortname = "op",
    namespaced,
    status = "OperationStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Transferable","type":"boolean","jsonPath":".status.ownerTransferable"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OperationSpec {
    /// Applications provisioned by this Operation
    #[serde(default)]
    pub applications: Vec<Application>,
}

/// Status of an Operation, owned by the Operation controller
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    /// Current phase
    #[serde(default)]
    pub phase: OperationPhase,

    /// True iff the Operation sits in a Cache pool and may be acquired
    #[serde(default)]
    pub owner_transferable: bool,

    /// When the Operation was first observed Ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_time: Option<DateTime<Utc>>,
}

impl OperationSpec {
    /// Validate the template before it is hashed or materialized
    pub fn validate(&self) -> Result<(), Error> {
        if self.applications.is_empty() {
            return Err(Error::validation_for_field(
                "spec.template.applications",
                "template must contain at least one application",
            ));
        }

        let mut seen = HashSet::new();
        for (i, app) in self.applications.iter().enumerate() {
            let field = format!("spec.template.applications[{i}]");
            validate_dns_label(&app.name)
                .map_err(|msg| Error::validation_for_field(format!("{field}.name"), msg))?;
            if !seen.insert(app.name.as_str()) {
                return Err(Error::validation_for_field(
                    format!("{field}.name"),
                    format!("duplicate application name '{}'", app.name),
                ));
            }
            if app.provision.image.trim().is_empty() {
                return Err(Error::validation_for_field(
                    format!("{field}.provision.image"),
                    "provision job image cannot be empty",
                ));
            }
            if let Some(teardown) = &app.teardown {
                if teardown.image.trim().is_empty() {
                    return Err(Error::validation_for_field(
                        format!("{field}.teardown.image"),
                        "teardown job image cannot be empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Operation {
    /// Current phase, `Pending` when no status has been written yet
    pub fn phase(&self) -> OperationPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// True if the Operation controller reports Ready
    pub fn is_ready(&self) -> bool {
        self.phase() == OperationPhase::Ready
    }

    /// True if the Operation is flagged as acquirable from its pool
    pub fn is_transferable(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.owner_transferable)
    }

    /// Timestamp of the Ready transition, if reported
    pub fn ready_time(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|s| s.ready_time)
    }
}
