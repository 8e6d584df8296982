//! Watch mappers: which Requirements to reconcile when a related object changes

use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use devinfra_common::crd::{Cache, Operation, Requirement, RequirementPhase, API_VERSION, CACHE_NAME_PREFIX};
use devinfra_common::kube_utils::owners_of_kind;

/// Every Requirement holding an owner reference on this Operation, whether
/// it owns the Operation outright or claimed it from a pool.
pub fn requirements_for_operation(op: &Operation) -> Vec<ObjectRef<Requirement>> {
    let namespace = op.namespace();
    owners_of_kind(&op.metadata, "Requirement")
        .filter(|r| r.api_version == API_VERSION)
        .map(|r| {
            let obj = ObjectRef::new(&r.name);
            match &namespace {
                Some(ns) => obj.within(ns),
                None => obj,
            }
        })
        .collect()
}

/// Requirements waiting on this Cache's pool.
///
/// Only Requirements in `CacheChecking` with a matching cache key and
/// namespace are woken; everything else is unaffected by pool changes.
pub fn requirements_for_cache(
    cache: &Cache,
    requirements: &[Arc<Requirement>],
) -> Vec<ObjectRef<Requirement>> {
    let name = cache.name_any();
    let Some(key) = cache
        .status
        .as_ref()
        .and_then(|s| s.cache_key.clone())
        .or_else(|| name.strip_prefix(CACHE_NAME_PREFIX).map(str::to_string))
    else {
        return Vec::new();
    };
    let namespace = cache.namespace();

    requirements
        .iter()
        .filter(|req| req.namespace() == namespace)
        .filter(|req| req.phase() == RequirementPhase::CacheChecking)
        .filter(|req| {
            req.status
                .as_ref()
                .and_then(|s| s.cache_key.as_deref())
                == Some(key.as_str())
        })
        .map(|req| ObjectRef::from_obj(req.as_ref()))
        .collect()
}
