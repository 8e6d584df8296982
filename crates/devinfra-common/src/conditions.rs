//! Condition-set maintenance
//!
//! A status carries a short, insertion-ordered list of conditions that is
//! treated as a set keyed by `type`. Lookups are linear; the list never
//! holds two entries of the same type.

use chrono::{DateTime, Utc};

use crate::crd::{Condition, ConditionStatus};

/// Condition types emitted on a Requirement
pub mod types {
    /// Spec hash computed and persisted
    pub const REQUIREMENT_INITIALIZED: &str = "RequirementInitialized";
    /// A Cache for this key exists (or was created)
    pub const CACHE_CR_FOUND: &str = "CacheCRFound";
    /// An Operation was claimed from the Cache pool
    pub const CACHED_OP_ACQUIRED: &str = "CachedOpAcquired";
    /// The bound Operation reports Ready
    pub const OPERATION_READY: &str = "OperationReady";
}

/// Condition reasons emitted on a Requirement
pub mod reasons {
    /// Pool had nothing acquirable
    pub const NO_OPERATION_AVAILABLE: &str = "NoOperationAvailable";
    /// Cache lookup pending or Cache missing
    pub const CACHE_CR_NOT_FOUND: &str = "CacheCRNotFound";
    /// Cache exists
    pub const CACHE_CR_FOUND: &str = "CacheCRFound";
    /// Operation claimed from the pool
    pub const CACHE_HIT: &str = "CacheHit";
    /// Operation minted for this Requirement
    pub const CACHE_MISS: &str = "CacheMiss";
    /// Spec failed validation
    pub const INVALID_SPEC: &str = "InvalidSpec";
    /// Cache key computed and finalizer attached
    pub const INITIALIZED: &str = "Initialized";
    /// Bound Operation reports Ready
    pub const OPERATION_READY: &str = "OperationReady";
    /// Bound Operation exists but is not Ready
    pub const OPERATION_NOT_READY: &str = "OperationNotReady";
    /// Bound Operation disappeared
    pub const OPERATION_LOST: &str = "OperationLost";
}

/// Find a condition by type
pub fn find<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// True if a condition of this type exists with status `True`
pub fn is_true(conditions: &[Condition], type_: &str) -> bool {
    find(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Insert or replace a condition by type.
///
/// The incoming `last_transition_time` is used only when the status changes
/// (or the type is new); otherwise the existing timestamp is kept. Returns
/// true iff status, reason, message or last-transition time differ from what
/// was stored before.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        None => {
            conditions.push(condition);
            true
        }
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            if *existing == condition {
                return false;
            }
            *existing = condition;
            true
        }
    }
}

/// Convenience wrapper around [`set_condition`] taking explicit fields
pub fn set(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> bool {
    set_condition(
        conditions,
        Condition::new(type_, status, reason, message).at(now),
    )
}

/// Reset to an empty (but present) condition set
pub fn clear(conditions: &mut Vec<Condition>) {
    conditions.clear();
}
