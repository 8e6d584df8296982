//! Requirement reconciliation controller
//!
//! Drives a Requirement through its lifecycle:
//! - `""` → validate, attach finalizer, compute cache key → `CacheChecking`
//!   (caching enabled) or `Operating`
//! - `CacheChecking` → find or create the Cache, claim a warm Operation →
//!   `Operating`, or wait for the pool to refill
//! - `Operating` → create an owned Operation if none is bound, poll the bound
//!   one → `Ready`
//! - `Ready` → periodic resync of the bound Operation
//! - deletion → `Deleting` → release claimed Operations → `Deleted`, finalizer
//!   removed
//!
//! Each reconcile commits at most one status write. Claims and releases of
//! pooled Operations are compare-and-swap patches on the Operation's
//! resourceVersion; losing the race surfaces as [`Error::Conflict`] and is
//! requeued immediately.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use devinfra_common::cache_key::cache_key;
use devinfra_common::conditions::{self, reasons, types};
use devinfra_common::crd::{
    Cache, CacheSpec, ConditionStatus, Operation, Requirement, RequirementPhase,
    RequirementStatus, CACHE_KEY_LABEL, DNS_LABEL_MAX_LEN, REQUIREMENT_FINALIZER,
    REQUIREMENT_LABEL,
};
use devinfra_common::events::{self, EventPublisher, KubeEventPublisher, NoopEventPublisher};
use devinfra_common::kube_utils::{
    controller_owner, find_owner, owner_reference, random_suffix, with_owner, without_owner,
};
use devinfra_common::metrics::{self, CacheLookup, ReconcileTimer};
use devinfra_common::retry::RetryConfig;
use devinfra_common::Error;

use crate::client::{KubeRequirementClient, RequirementClient};
use crate::pool;

/// Component name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "devinfra-requirement-controller";

/// Length of the random suffix on Operation names
const OPERATION_SUFFIX_LEN: usize = 5;

/// Tunables for the reconciler
#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    /// Requeue while waiting for the Cache pool to offer an Operation
    pub cache_poll_interval: Duration,
    /// Requeue while the bound Operation is not Ready
    pub readiness_poll_interval: Duration,
    /// Resync interval once Ready
    pub ready_resync_interval: Duration,
    /// Deadline for a single reconcile
    pub reconcile_timeout: Duration,
    /// Pool size for Caches created without sizing hints
    pub default_keep_alive_count: u32,
    /// Idle TTL for Caches created without sizing hints
    pub default_keep_alive_duration: String,
    /// Backoff schedule for failed reconciles
    pub retry: RetryConfig,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            cache_poll_interval: Duration::from_secs(10),
            readiness_poll_interval: Duration::from_secs(5),
            ready_resync_interval: Duration::from_secs(600),
            reconcile_timeout: Duration::from_secs(30),
            default_keep_alive_count: 1,
            default_keep_alive_duration: "30m".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

/// Shared state for the Requirement controller
pub struct Context {
    /// Cluster access (trait object for testability)
    pub client: Arc<dyn RequirementClient>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Reconciler tunables
    pub config: ReconcileConfig,
    /// Consecutive failures per `namespace/name`, reset on success
    failures: DashMap<String, u32>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context with mock clients and no event recording
    pub fn for_testing(client: Arc<dyn RequirementClient>) -> Self {
        Self {
            client,
            events: Arc::new(NoopEventPublisher),
            config: ReconcileConfig::default(),
            failures: DashMap::new(),
        }
    }

    /// Consecutive failure count recorded for a Requirement
    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.get(key).map(|c| *c).unwrap_or(0)
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    requirement_client: Option<Arc<dyn RequirementClient>>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ReconcileConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            requirement_client: None,
            events: None,
            config: ReconcileConfig::default(),
        }
    }

    /// Override the cluster client
    pub fn requirement_client(mut self, client: Arc<dyn RequirementClient>) -> Self {
        self.requirement_client = Some(client);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set reconciler tunables
    pub fn config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            client: self
                .requirement_client
                .unwrap_or_else(|| Arc::new(KubeRequirementClient::new(self.client.clone()))),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(KubeEventPublisher::new(self.client, CONTROLLER_NAME))),
            config: self.config,
            failures: DashMap::new(),
        }
    }
}

fn failure_key(req: &Requirement) -> String {
    format!("{}/{}", req.namespace().unwrap_or_default(), req.name_any())
}

/// Reconcile a Requirement
///
/// Runs one convergence step under the configured deadline and records
/// duration/error metrics. A success clears the Requirement's backoff state.
#[instrument(
    skip(req, ctx),
    fields(requirement = %req.name_any(), namespace = %req.namespace().unwrap_or_default())
)]
pub async fn reconcile(req: Arc<Requirement>, ctx: Arc<Context>) -> Result<Action, Error> {
    let timer = ReconcileTimer::start();
    let key = failure_key(&req);
    let timeout = ctx.config.reconcile_timeout;

    let result = match tokio::time::timeout(timeout, reconcile_requirement(&req, &ctx)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            resource: key.clone(),
            seconds: timeout.as_secs(),
        }),
    };

    match &result {
        Ok(_) => {
            timer.success();
            ctx.failures.remove(&key);
        }
        Err(e) => timer.error(e.kind_label()),
    }
    result
}

/// Error policy for the Requirement controller
///
/// - conflicts requeue immediately
/// - non-retryable errors wait for the next change to the Requirement
/// - everything else backs off exponentially per Requirement
pub fn error_policy(req: Arc<Requirement>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = failure_key(&req);

    if error.is_conflict() {
        debug!(requirement = %key, %error, "conflict, requeueing immediately");
        return Action::requeue(Duration::ZERO);
    }

    if !error.is_retryable() {
        warn!(requirement = %key, %error, "permanent reconcile error, awaiting change");
        return Action::await_change();
    }

    let attempt = {
        let mut count = ctx.failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    };
    let delay = ctx.config.retry.delay_for_attempt(attempt);
    error!(
        requirement = %key,
        %error,
        attempt,
        delay_ms = delay.as_millis() as u64,
        "reconciliation failed"
    );
    Action::requeue(delay)
}

async fn reconcile_requirement(req: &Requirement, ctx: &Context) -> Result<Action, Error> {
    let name = req.name_any();
    let namespace = req
        .namespace()
        .ok_or_else(|| Error::validation("Requirement must be namespaced").for_resource(&name))?;
    let status = req.status.clone().unwrap_or_default();
    let now = Utc::now();

    if req.is_deleting() {
        return reconcile_deletion(req, &namespace, status, ctx).await;
    }

    if let Err(e) = req.spec.validate() {
        return report_invalid_spec(req, &namespace, status, e.for_resource(&name), ctx, now).await;
    }

    debug!(phase = %status.phase, "reconciling requirement");
    match status.phase {
        RequirementPhase::Initial => initialize(req, &namespace, status, ctx, now).await,
        RequirementPhase::CacheChecking => check_cache(req, &namespace, status, ctx, now).await,
        RequirementPhase::Operating => match status.operation_name.clone() {
            Some(op_name) => poll_operation(req, &namespace, status, &op_name, ctx, now).await,
            None if req.spec.enable_cache => {
                // Cache path never mints its own Operation
                let mut status = status;
                status.phase = RequirementPhase::CacheChecking;
                commit_status(req, &namespace, status, ctx).await?;
                Ok(Action::requeue(Duration::ZERO))
            }
            None => ensure_owned_operation(req, &namespace, status, ctx, now).await,
        },
        RequirementPhase::Ready => match status.operation_name.clone() {
            Some(op_name) => poll_operation(req, &namespace, status, &op_name, ctx, now).await,
            None => operation_lost(req, &namespace, status, "no operation bound", ctx, now).await,
        },
        // Only reachable with a deletion timestamp, handled above
        RequirementPhase::Deleting | RequirementPhase::Deleted => Ok(Action::await_change()),
    }
}

/// Write the status if it differs from what is stored.
///
/// Returns true if a write was issued.
async fn commit_status(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    ctx: &Context,
) -> Result<bool, Error> {
    status.observed_generation = req.metadata.generation;
    if req.status.as_ref() == Some(&status) {
        return Ok(false);
    }
    ctx.client
        .patch_status(namespace, &req.name_any(), &status)
        .await?;
    Ok(true)
}

async fn publish(
    ctx: &Context,
    req: &Requirement,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&req.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

async fn report_invalid_spec(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    err: Error,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    warn!(error = %err, "invalid requirement spec");
    conditions::set(
        &mut status.conditions,
        types::REQUIREMENT_INITIALIZED,
        ConditionStatus::False,
        reasons::INVALID_SPEC,
        err.to_string(),
        now,
    );
    if commit_status(req, namespace, status, ctx).await? {
        publish(
            ctx,
            req,
            EventType::Warning,
            events::reasons::INVALID_SPEC,
            events::actions::RECONCILE,
            err.to_string(),
        )
        .await;
    }
    Ok(Action::await_change())
}

/// First reconcile: attach the finalizer, compute the cache key, pick a path
async fn initialize(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    if !req.has_finalizer() {
        ctx.client
            .add_finalizer(namespace, &req.name_any(), REQUIREMENT_FINALIZER)
            .await?;
    }

    let key = cache_key(&req.spec.template)?;
    conditions::set(
        &mut status.conditions,
        types::REQUIREMENT_INITIALIZED,
        ConditionStatus::True,
        reasons::INITIALIZED,
        format!("template hashed to {key}"),
        now,
    );

    if req.spec.enable_cache {
        conditions::set(
            &mut status.conditions,
            types::CACHE_CR_FOUND,
            ConditionStatus::False,
            reasons::CACHE_CR_NOT_FOUND,
            format!("looking up {}", Cache::name_for_key(&key)),
            now,
        );
        status.cache_key = Some(key);
        status.phase = RequirementPhase::CacheChecking;
    } else {
        status.phase = RequirementPhase::Operating;
    }

    info!(phase = %status.phase, "requirement initialized");
    commit_status(req, namespace, status, ctx).await?;
    Ok(Action::requeue(Duration::ZERO))
}

fn build_cache(req: &Requirement, key: &str, config: &ReconcileConfig) -> Cache {
    let sizing = req.spec.cache_spec.clone().unwrap_or_default();
    let mut cache = Cache::new(
        &Cache::name_for_key(key),
        CacheSpec {
            template: req.spec.template.clone(),
            keep_alive_count: sizing
                .keep_alive_count
                .unwrap_or(config.default_keep_alive_count),
            keep_alive_duration: sizing
                .keep_alive_duration
                .unwrap_or_else(|| config.default_keep_alive_duration.clone()),
        },
    );
    cache.metadata.namespace = req.namespace();
    cache.metadata.labels = Some(BTreeMap::from([(
        CACHE_KEY_LABEL.to_string(),
        key.to_string(),
    )]));
    cache
}

/// CacheChecking: find or create the Cache, then try to claim from its pool
async fn check_cache(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let key = match status.cache_key.clone() {
        Some(key) => key,
        None => {
            let key = cache_key(&req.spec.template)?;
            status.cache_key = Some(key.clone());
            key
        }
    };
    let cache_name = Cache::name_for_key(&key);
    let uid = req
        .uid()
        .ok_or_else(|| Error::internal_with_context("reconciler", "Requirement has no UID"))?;

    let Some(cache) = ctx.client.get_cache(namespace, &cache_name).await? else {
        let cache = build_cache(req, &key, &ctx.config);
        let created = ctx.client.create_cache(namespace, &cache).await?;
        if created {
            info!(cache = %cache_name, "created cache");
            publish(
                ctx,
                req,
                EventType::Normal,
                events::reasons::CACHE_CREATED,
                events::actions::CREATE,
                format!("created {cache_name}"),
            )
            .await;
        }
        conditions::set(
            &mut status.conditions,
            types::CACHE_CR_FOUND,
            ConditionStatus::True,
            reasons::CACHE_CR_FOUND,
            format!("{cache_name} exists"),
            now,
        );
        conditions::set(
            &mut status.conditions,
            types::CACHED_OP_ACQUIRED,
            ConditionStatus::False,
            reasons::NO_OPERATION_AVAILABLE,
            format!("{cache_name} has no warm operation yet"),
            now,
        );
        metrics::record_cache_lookup(CacheLookup::Empty);
        commit_status(req, namespace, status, ctx).await?;
        return Ok(Action::requeue(ctx.config.cache_poll_interval));
    };

    conditions::set(
        &mut status.conditions,
        types::CACHE_CR_FOUND,
        ConditionStatus::True,
        reasons::CACHE_CR_FOUND,
        format!("{cache_name} exists"),
        now,
    );

    let selector = format!("{CACHE_KEY_LABEL}={key}");
    let operations = ctx.client.list_operations(namespace, &selector).await?;

    // A previous claim may have committed without its status write
    if let Some(op) = pool::find_claimed_by(&operations, &uid) {
        let op_name = op.name_any();
        info!(operation = %op_name, "adopting previously claimed operation");
        return record_claim(req, namespace, status, &cache_name, op_name, ctx, now).await;
    }

    let Some(candidate) = pool::select_candidate(&cache, &operations) else {
        debug!(cache = %cache_name, pool = cache.pooled_operations().len(), "no acquirable operation");
        conditions::set(
            &mut status.conditions,
            types::CACHED_OP_ACQUIRED,
            ConditionStatus::False,
            reasons::NO_OPERATION_AVAILABLE,
            format!("{cache_name} has no acquirable operation"),
            now,
        );
        metrics::record_cache_lookup(CacheLookup::Empty);
        commit_status(req, namespace, status, ctx).await?;
        return Ok(Action::requeue(ctx.config.cache_poll_interval));
    };

    let op_name = candidate.name_any();
    let resource_version = candidate.resource_version().ok_or_else(|| {
        Error::internal_with_context("reconciler", format!("operation {op_name} has no resourceVersion"))
    })?;
    let owners = with_owner(&candidate.metadata, owner_reference(req, false)?);

    if let Err(e) = ctx
        .client
        .patch_operation_owners(namespace, &op_name, &resource_version, owners)
        .await
    {
        if e.is_conflict() {
            metrics::record_claim_conflict();
            debug!(operation = %op_name, "lost claim race");
        }
        return Err(e);
    }

    info!(operation = %op_name, cache = %cache_name, "claimed operation from cache");
    metrics::record_cache_lookup(CacheLookup::Hit);
    publish(
        ctx,
        req,
        EventType::Normal,
        events::reasons::CACHE_HIT,
        events::actions::ACQUIRE,
        format!("claimed {op_name} from {cache_name}"),
    )
    .await;
    record_claim(req, namespace, status, &cache_name, op_name, ctx, now).await
}

async fn record_claim(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    cache_name: &str,
    op_name: String,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    conditions::set(
        &mut status.conditions,
        types::CACHED_OP_ACQUIRED,
        ConditionStatus::True,
        reasons::CACHE_HIT,
        format!("acquired {op_name} from {cache_name}"),
        now,
    );
    status.operation_name = Some(op_name);
    status.phase = RequirementPhase::Operating;
    commit_status(req, namespace, status, ctx).await?;
    Ok(Action::requeue(ctx.config.readiness_poll_interval))
}

fn build_owned_operation(req: &Requirement, key: &str) -> Result<Operation, Error> {
    let name = format!("{key}-{}", random_suffix(OPERATION_SUFFIX_LEN));
    let mut op = Operation::new(&name, req.spec.template.clone());
    op.metadata.namespace = req.namespace();

    let mut labels = BTreeMap::from([(CACHE_KEY_LABEL.to_string(), key.to_string())]);
    let req_name = req.name_any();
    // Label values are capped at 63 characters; object names are not
    if req_name.len() <= DNS_LABEL_MAX_LEN {
        labels.insert(REQUIREMENT_LABEL.to_string(), req_name);
    }
    op.metadata.labels = Some(labels);
    op.metadata.owner_references = Some(vec![owner_reference(req, true)?]);
    Ok(op)
}

/// Operating without a bound Operation (cache disabled): ensure one exists
/// that this Requirement controller-owns
async fn ensure_owned_operation(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let key = cache_key(&req.spec.template)?;
    let uid = req
        .uid()
        .ok_or_else(|| Error::internal_with_context("reconciler", "Requirement has no UID"))?;

    let selector = format!("{CACHE_KEY_LABEL}={key}");
    let existing = ctx.client.list_operations(namespace, &selector).await?;
    let owned = existing
        .iter()
        .find(|op| controller_owner(&op.metadata).is_some_and(|o| o.uid == uid));

    let op_name = match owned {
        Some(op) => {
            debug!(operation = %op.name_any(), "found owned operation");
            op.name_any()
        }
        None => {
            let op = build_owned_operation(req, &key)?;
            let created = ctx.client.create_operation(namespace, &op).await?;
            let op_name = created.name_any();
            info!(operation = %op_name, "created operation");
            publish(
                ctx,
                req,
                EventType::Normal,
                events::reasons::OPERATION_CREATED,
                events::actions::CREATE,
                format!("created {op_name}"),
            )
            .await;
            op_name
        }
    };

    metrics::record_cache_lookup(CacheLookup::Miss);
    conditions::set(
        &mut status.conditions,
        types::CACHED_OP_ACQUIRED,
        ConditionStatus::False,
        reasons::CACHE_MISS,
        format!("{op_name} provisioned for this requirement"),
        now,
    );
    status.operation_name = Some(op_name);
    status.phase = RequirementPhase::Operating;
    commit_status(req, namespace, status, ctx).await?;
    Ok(Action::requeue(ctx.config.readiness_poll_interval))
}

/// Operating/Ready with a bound Operation: mirror its readiness
async fn poll_operation(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    op_name: &str,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    let uid = req
        .uid()
        .ok_or_else(|| Error::internal_with_context("reconciler", "Requirement has no UID"))?;

    let op = match ctx.client.get_operation(namespace, op_name).await? {
        Some(op) if find_owner(&op.metadata, &uid).is_some() => op,
        Some(_) => {
            let msg = format!("{op_name} no longer references this requirement");
            return operation_lost(req, namespace, status, &msg, ctx, now).await;
        }
        None => {
            let msg = format!("{op_name} was deleted");
            return operation_lost(req, namespace, status, &msg, ctx, now).await;
        }
    };

    if op.is_ready() {
        let was_ready = status.phase == RequirementPhase::Ready;
        conditions::set(
            &mut status.conditions,
            types::OPERATION_READY,
            ConditionStatus::True,
            reasons::OPERATION_READY,
            format!("{op_name} is Ready"),
            now,
        );
        status.phase = RequirementPhase::Ready;
        commit_status(req, namespace, status, ctx).await?;
        if !was_ready {
            info!(operation = %op_name, "requirement ready");
            publish(
                ctx,
                req,
                EventType::Normal,
                events::reasons::OPERATION_READY,
                events::actions::RECONCILE,
                format!("{op_name} is Ready"),
            )
            .await;
        }
        return Ok(Action::requeue(ctx.config.ready_resync_interval));
    }

    conditions::set(
        &mut status.conditions,
        types::OPERATION_READY,
        ConditionStatus::False,
        reasons::OPERATION_NOT_READY,
        format!("{op_name} is {}", op.phase()),
        now,
    );
    status.phase = RequirementPhase::Operating;
    commit_status(req, namespace, status, ctx).await?;
    Ok(Action::requeue(ctx.config.readiness_poll_interval))
}

/// The bound Operation is gone: unbind and restart acquisition
async fn operation_lost(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    message: &str,
    ctx: &Context,
    now: DateTime<Utc>,
) -> Result<Action, Error> {
    warn!(detail = message, "bound operation lost");
    conditions::set(
        &mut status.conditions,
        types::OPERATION_READY,
        ConditionStatus::False,
        reasons::OPERATION_LOST,
        message,
        now,
    );
    status.operation_name = None;
    status.phase = if req.spec.enable_cache {
        RequirementPhase::CacheChecking
    } else {
        RequirementPhase::Operating
    };
    commit_status(req, namespace, status, ctx).await?;
    Ok(Action::requeue(Duration::ZERO))
}

/// Deletion: mark Deleting, hand claimed Operations back, then drop the finalizer.
///
/// Operations this Requirement controller-owns are left to the garbage
/// collector. The finalizer is only removed once every release patch has
/// committed.
async fn reconcile_deletion(
    req: &Requirement,
    namespace: &str,
    mut status: RequirementStatus,
    ctx: &Context,
) -> Result<Action, Error> {
    if !req.has_finalizer() {
        return Ok(Action::await_change());
    }

    if !matches!(
        status.phase,
        RequirementPhase::Deleting | RequirementPhase::Deleted
    ) {
        info!("requirement deletion started");
        status.phase = RequirementPhase::Deleting;
        commit_status(req, namespace, status, ctx).await?;
        return Ok(Action::requeue(Duration::ZERO));
    }

    if let Some(key) = status.cache_key.as_deref() {
        release_claimed_operations(req, namespace, key, ctx).await?;
    }

    status.phase = RequirementPhase::Deleted;
    commit_status(req, namespace, status, ctx).await?;
    ctx.client
        .remove_finalizer(namespace, &req.name_any(), REQUIREMENT_FINALIZER)
        .await?;
    info!("requirement deleted");
    Ok(Action::await_change())
}

async fn release_claimed_operations(
    req: &Requirement,
    namespace: &str,
    key: &str,
    ctx: &Context,
) -> Result<(), Error> {
    let uid = req
        .uid()
        .ok_or_else(|| Error::internal_with_context("reconciler", "Requirement has no UID"))?;
    let selector = format!("{CACHE_KEY_LABEL}={key}");
    let operations = ctx.client.list_operations(namespace, &selector).await?;

    for op in &operations {
        let held = find_owner(&op.metadata, &uid).is_some_and(|r| r.controller != Some(true));
        if !held {
            continue;
        }
        let op_name = op.name_any();
        let resource_version = op.resource_version().ok_or_else(|| {
            Error::internal_with_context(
                "reconciler",
                format!("operation {op_name} has no resourceVersion"),
            )
        })?;
        ctx.client
            .patch_operation_owners(
                namespace,
                &op_name,
                &resource_version,
                without_owner(&op.metadata, &uid),
            )
            .await?;

        info!(operation = %op_name, "released operation back to cache");
        metrics::record_operation_released();
        publish(
            ctx,
            req,
            EventType::Normal,
            events::reasons::OPERATION_RELEASED,
            events::actions::DELETE,
            format!("released {op_name}"),
        )
        .await;
    }
    Ok(())
}
