//! Cluster access for the Requirement reconciler
//!
//! [`RequirementClient`] is the seam between reconcile logic and the API
//! server. Every write goes through the authoritative client; reads may be
//! served by the controller's store upstream of this trait.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use devinfra_common::crd::{Cache, Operation, Requirement, RequirementStatus};
use devinfra_common::error::{for_named, is_kube_conflict, is_kube_not_found};
use devinfra_common::kube_utils::{patch_resource_status, with_finalizer, without_finalizer};
use devinfra_common::Error;

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "devinfra-requirement-controller";

/// Cluster operations needed by the Requirement reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RequirementClient: Send + Sync {
    /// Write the status of a Requirement as one merge patch
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RequirementStatus,
    ) -> Result<(), Error>;

    /// Add a finalizer to a Requirement (no-op if present)
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer from a Requirement (no-op if absent or if the
    /// Requirement is already gone)
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Get a Cache by name
    async fn get_cache(&self, namespace: &str, name: &str) -> Result<Option<Cache>, Error>;

    /// Create a Cache.
    ///
    /// Returns `false` if a Cache with that name already existed.
    async fn create_cache(&self, namespace: &str, cache: &Cache) -> Result<bool, Error>;

    /// Get an Operation by name
    async fn get_operation(&self, namespace: &str, name: &str)
        -> Result<Option<Operation>, Error>;

    /// List Operations matching a label selector
    async fn list_operations(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Operation>, Error>;

    /// Create an Operation and return the stored object
    async fn create_operation(
        &self,
        namespace: &str,
        operation: &Operation,
    ) -> Result<Operation, Error>;

    /// Replace an Operation's owner references, guarded by `resource_version`.
    ///
    /// Fails with [`Error::Conflict`] if the Operation changed or vanished
    /// since it was read.
    async fn patch_operation_owners(
        &self,
        namespace: &str,
        name: &str,
        resource_version: &str,
        owners: Vec<OwnerReference>,
    ) -> Result<(), Error>;
}

/// [`RequirementClient`] backed by the Kubernetes API
pub struct KubeRequirementClient {
    client: Client,
}

impl KubeRequirementClient {
    /// Create a new client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn requirements(&self, namespace: &str) -> Api<Requirement> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn caches(&self, namespace: &str) -> Api<Cache> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn operations(&self, namespace: &str) -> Api<Operation> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RequirementClient for KubeRequirementClient {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RequirementStatus,
    ) -> Result<(), Error> {
        patch_resource_status::<Requirement>(&self.client, name, namespace, status, FIELD_MANAGER)
            .await
            .map_err(|e| for_named("Requirement", name, e))
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.requirements(namespace);
        let req = api
            .get(name)
            .await
            .map_err(|e| for_named("Requirement", name, e))?;
        let Some(finalizers) = with_finalizer(&req.metadata, finalizer) else {
            return Ok(());
        };

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": req.metadata.resource_version,
                "finalizers": finalizers
            }
        });
        api.patch(name, &Self::patch_params(), &Patch::Merge(&patch))
            .await
            .map_err(|e| for_named("Requirement", name, e))?;
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.requirements(namespace);
        let Some(req) = api.get_opt(name).await? else {
            return Ok(());
        };
        let Some(finalizers) = without_finalizer(&req.metadata, finalizer) else {
            return Ok(());
        };

        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": req.metadata.resource_version,
                "finalizers": finalizers
            }
        });
        match api
            .patch(name, &Self::patch_params(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_kube_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_cache(&self, namespace: &str, name: &str) -> Result<Option<Cache>, Error> {
        Ok(self.caches(namespace).get_opt(name).await?)
    }

    async fn create_cache(&self, namespace: &str, cache: &Cache) -> Result<bool, Error> {
        match self
            .caches(namespace)
            .create(&PostParams::default(), cache)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_kube_conflict(&e) => {
                debug!(namespace, "Cache already exists");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_operation(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Operation>, Error> {
        Ok(self.operations(namespace).get_opt(name).await?)
    }

    async fn list_operations(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Operation>, Error> {
        let list = self
            .operations(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn create_operation(
        &self,
        namespace: &str,
        operation: &Operation,
    ) -> Result<Operation, Error> {
        // Names carry a random suffix; a collision retries with a fresh one
        self.operations(namespace)
            .create(&PostParams::default(), operation)
            .await
            .map_err(|e| {
                if is_kube_conflict(&e) {
                    let name = operation.metadata.name.clone().unwrap_or_default();
                    Error::conflict("Operation", name, e.to_string())
                } else {
                    e.into()
                }
            })
    }

    async fn patch_operation_owners(
        &self,
        namespace: &str,
        name: &str,
        resource_version: &str,
        owners: Vec<OwnerReference>,
    ) -> Result<(), Error> {
        // resourceVersion in a merge patch turns the write into a
        // compare-and-swap: the API server answers 409 if it moved.
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version,
                "ownerReferences": owners
            }
        });
        match self
            .operations(namespace)
            .patch(name, &Self::patch_params(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_kube_conflict(&e) || is_kube_not_found(&e) => {
                Err(Error::conflict("Operation", name, e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
