//! Kubernetes helpers shared by devinfra controllers
//!
//! Owner references are the weak graph linking Requirements, Caches and
//! Operations. Controller-owned children are garbage-collected by the
//! cluster; non-controller references are advisory and must be removed
//! explicitly by whoever added them.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use rand::Rng;

use crate::Error;

/// Build an owner reference pointing at `owner`.
///
/// `controller = true` marks the unique lifecycle owner; the cluster garbage
/// collector deletes the child once that owner is gone.
pub fn owner_reference<K>(owner: &K, controller: bool) -> Result<OwnerReference, Error>
where
    K: Resource<DynamicType = ()>,
{
    let uid = owner
        .meta()
        .uid
        .clone()
        .ok_or_else(|| Error::internal_with_context("owner-ref", "owner has no UID"))?;
    Ok(OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: owner.name_any(),
        uid,
        controller: Some(controller),
        block_owner_deletion: Some(true),
    })
}

/// The controller owner reference, if any
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| r.controller == Some(true))
}

/// All owner references of the given kind
pub fn owners_of_kind<'a>(
    meta: &'a ObjectMeta,
    kind: &'a str,
) -> impl Iterator<Item = &'a OwnerReference> + 'a {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(move |r| r.kind == kind)
}

/// Find the owner reference with this UID
pub fn find_owner<'a>(meta: &'a ObjectMeta, uid: &str) -> Option<&'a OwnerReference> {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|r| r.uid == uid)
}

/// Owner references with `reference` appended (replacing any entry with the same UID)
pub fn with_owner(meta: &ObjectMeta, reference: OwnerReference) -> Vec<OwnerReference> {
    let mut refs: Vec<OwnerReference> = meta
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|r| r.uid != reference.uid)
        .cloned()
        .collect();
    refs.push(reference);
    refs
}

/// Owner references with the entry for `uid` removed
pub fn without_owner(meta: &ObjectMeta, uid: &str) -> Vec<OwnerReference> {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter(|r| r.uid != uid)
        .cloned()
        .collect()
}

/// Finalizers with `finalizer` added; `None` if already present
pub fn with_finalizer(meta: &ObjectMeta, finalizer: &str) -> Option<Vec<String>> {
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == finalizer) {
        return None;
    }
    finalizers.push(finalizer.to_string());
    Some(finalizers)
}

/// Finalizers with `finalizer` removed; `None` if it was not present
pub fn without_finalizer(meta: &ObjectMeta, finalizer: &str) -> Option<Vec<String>> {
    let finalizers = meta.finalizers.as_deref().unwrap_or_default();
    if !finalizers.iter().any(|f| f == finalizer) {
        return None;
    }
    Some(
        finalizers
            .iter()
            .filter(|f| *f != finalizer)
            .cloned()
            .collect(),
    )
}

/// Lowercase alphanumeric suffix for generated names
pub fn random_suffix(len: usize) -> String {
    const CHARSET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Patch the status sub-resource of a namespaced resource.
///
/// Serializes `status` into `{ "status": <status> }` and applies it via
/// merge-patch, so the whole status is committed in one write.
pub async fn patch_resource_status<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &impl serde::Serialize,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    let params = PatchParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    };
    api.patch_status(name, &params, &Patch::Merge(&patch))
        .await?;
    Ok(())
}
