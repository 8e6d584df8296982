//! Warm-pool selection
//!
//! Picks which pooled Operation a Requirement should try to claim. Every
//! reconciler must agree on the order so concurrent claimants race for the
//! same entry and exactly one wins the resourceVersion check.

use kube::ResourceExt;

use devinfra_common::crd::{Cache, Operation};
use devinfra_common::kube_utils::{controller_owner, owners_of_kind};

const REQUIREMENT_KIND: &str = "Requirement";
const CACHE_KIND: &str = "Cache";

/// True if `op` can be claimed out of `cache`'s pool right now.
///
/// The Operation must be Ready, flagged transferable, not being deleted,
/// controller-owned by this Cache, and not held by any Requirement.
pub fn is_acquirable(op: &Operation, cache: &Cache) -> bool {
    if !op.is_ready() || !op.is_transferable() || op.metadata.deletion_timestamp.is_some() {
        return false;
    }
    if owners_of_kind(&op.metadata, REQUIREMENT_KIND).next().is_some() {
        return false;
    }
    controller_owner(&op.metadata).is_some_and(|owner| {
        owner.kind == CACHE_KIND
            && match cache.metadata.uid.as_deref() {
                Some(uid) => owner.uid == uid,
                None => owner.name == cache.name_any(),
            }
    })
}

/// Choose the Operation to claim from `cache`'s pool.
///
/// Only Operations listed in the Cache status are considered. Among the
/// acquirable ones the oldest `readyTime` wins (missing timestamps sort
/// last), then the lexicographically smallest name.
pub fn select_candidate<'a>(cache: &Cache, operations: &'a [Operation]) -> Option<&'a Operation> {
    let pool = cache.pooled_operations();
    operations
        .iter()
        .filter(|op| pool.iter().any(|name| *name == op.name_any()))
        .filter(|op| is_acquirable(op, cache))
        .min_by_key(|op| (op.ready_time().is_none(), op.ready_time(), op.name_any()))
}

/// Find an Operation this Requirement already holds through a non-controller
/// owner reference.
///
/// Covers a claim that committed while the status write that should have
/// recorded it did not.
pub fn find_claimed_by<'a>(operations: &'a [Operation], requirement_uid: &str) -> Option<&'a Operation> {
    operations.iter().find(|op| {
        owners_of_kind(&op.metadata, REQUIREMENT_KIND)
            .any(|r| r.uid == requirement_uid && r.controller != Some(true))
    })
}
