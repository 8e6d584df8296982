//! Kubernetes Event recording for devinfra controllers.
//!
//! Wraps `kube::runtime::events::Recorder` behind a trait so reconcilers can
//! emit Events visible via `kubectl describe requirement` while tests use a
//! no-op publisher.
//!
//! Events are fire-and-forget: failures are logged and never fail a
//! reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about a resource
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    ///
    /// * `reason` - machine-readable reason, see [`reasons`]
    /// * `action` - what the controller did, see [`actions`]
    /// * `note` - optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the Events API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`
    /// (e.g. "devinfra-requirement-controller").
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown under REASON in `kubectl get events`
pub mod reasons {
    /// The reconciler created the Cache for a key
    pub const CACHE_CREATED: &str = "CacheCreated";
    /// An Operation was claimed from a Cache pool
    pub const CACHE_HIT: &str = "CacheHit";
    /// An Operation was created for a single Requirement
    pub const OPERATION_CREATED: &str = "OperationCreated";
    /// The bound Operation reached Ready
    pub const OPERATION_READY: &str = "OperationReady";
    /// A claimed Operation was handed back on deletion
    pub const OPERATION_RELEASED: &str = "OperationReleased";
    /// Spec validation failed
    pub const INVALID_SPEC: &str = "InvalidSpec";
}

/// Event actions, shown under ACTION in `kubectl get events`
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Claiming from a Cache pool
    pub const ACQUIRE: &str = "Acquire";
    /// Creating a dependent resource
    pub const CREATE: &str = "Create";
    /// Deletion cleanup
    pub const DELETE: &str = "Delete";
}
