//! Integration stories for the Requirement lifecycle
//!
//! Each story runs in its own namespace with the Requirement controller and
//! the fake Operation/Cache controllers running in-process.

use std::time::Duration;

use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tokio::time::sleep;

use devinfra_common::cache_key::cache_key;
use devinfra_common::conditions::{self, reasons, types};
use devinfra_common::crd::{
    Cache, CacheSpec, ConditionStatus, Operation, Requirement, RequirementPhase, CACHE_KEY_LABEL,
};
use devinfra_common::kube_utils::{controller_owner, owners_of_kind};

use super::helpers::{
    cleanup_namespace, create_test_namespace, ensure_test_cluster, sample_requirement,
    sample_template, start_controller, wait_for, wait_for_deleted, wait_for_phase,
    FakeWorkloadControllers, PHASE_TIMEOUT,
};

async fn setup(prefix: &str) -> (Client, String) {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = create_test_namespace(&client, prefix).await;
    (client, namespace)
}

async fn operations_in(client: &Client, namespace: &str) -> Vec<Operation> {
    let api: Api<Operation> = Api::namespaced(client.clone(), namespace);
    api.list(&ListParams::default())
        .await
        .expect("failed to list operations")
        .items
}

fn pool_of(cache: &Cache) -> Vec<String> {
    cache.pooled_operations().to_vec()
}

/// Story: a developer asks for an environment without caching
///
/// Expected behavior:
/// - the Requirement reaches Ready
/// - exactly one Operation exists, controller-owned by the Requirement
/// - deleting the Requirement garbage-collects the Operation
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_simple_requirement_without_cache() {
    let (client, ns) = setup("no-cache").await;
    let _controller = start_controller(client.clone(), &ns);
    let _workloads = FakeWorkloadControllers::start(client.clone(), &ns);
    let api: Api<Requirement> = Api::namespaced(client.clone(), &ns);

    api.create(&PostParams::default(), &sample_requirement("test-requirement", false))
        .await
        .expect("failed to create requirement");

    let ready = wait_for_phase(&api, "test-requirement", RequirementPhase::Ready).await;
    let uid = ready.uid().expect("uid");
    let status = ready.status.expect("status");
    assert!(status.cache_key.is_none());
    assert!(conditions::is_true(&status.conditions, types::OPERATION_READY));

    let ops = operations_in(&client, &ns).await;
    assert_eq!(ops.len(), 1, "exactly one Operation should exist");
    let owner = controller_owner(&ops[0].metadata).expect("controller owner");
    assert_eq!(owner.kind, "Requirement");
    assert_eq!(owner.uid, uid);
    assert_eq!(status.operation_name, Some(ops[0].name_any()));

    api.delete("test-requirement", &DeleteParams::default())
        .await
        .expect("failed to delete requirement");
    wait_for_deleted(&api, "test-requirement").await;

    let ops_client = client.clone();
    let ops_ns = ns.clone();
    wait_for("owned Operation to be garbage collected", PHASE_TIMEOUT, || {
        let client = ops_client.clone();
        let ns = ops_ns.clone();
        async move { operations_in(&client, &ns).await.is_empty().then_some(()) }
    })
    .await;

    cleanup_namespace(&client, &ns).await;
}

/// Story: the first cached Requirement for a template creates the Cache,
/// then a second Requirement with the same template reuses a warm Operation
///
/// Expected behavior:
/// - a Cache named after the template hash is created and `cacheKey` is set
/// - the bound Operation is controlled by the Cache and referenced by the
///   Requirement, with `keepAliveCount` unclaimed Operations beside it
/// - after the first Requirement is deleted, the next one claims an Operation
///   out of the pool it found, which then leaves the pool
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_first_cached_requirement_then_cache_hit() {
    let (client, ns) = setup("cache-hit").await;
    let _controller = start_controller(client.clone(), &ns);
    let _workloads = FakeWorkloadControllers::start(client.clone(), &ns);
    let api: Api<Requirement> = Api::namespaced(client.clone(), &ns);
    let caches: Api<Cache> = Api::namespaced(client.clone(), &ns);

    api.create(&PostParams::default(), &sample_requirement("cached-requirement", true))
        .await
        .expect("failed to create requirement");

    let ready = wait_for_phase(&api, "cached-requirement", RequirementPhase::Ready).await;
    let status = ready.status.clone().expect("status");
    let key = cache_key(&sample_template()).expect("cache key");
    assert_eq!(status.cache_key.as_deref(), Some(key.as_str()));

    let cache = caches
        .get(&Cache::name_for_key(&key))
        .await
        .expect("Cache should have been created");
    assert_eq!(cache.labels().get(CACHE_KEY_LABEL), Some(&key));
    let keep_alive = cache.spec.keep_alive_count as usize;

    let bound = status.operation_name.clone().expect("operation bound");
    let ops_client = client.clone();
    let ops_ns = ns.clone();
    let ops = wait_for("pool to refill beside the claimed Operation", PHASE_TIMEOUT, || {
        let client = ops_client.clone();
        let ns = ops_ns.clone();
        async move {
            let ops = operations_in(&client, &ns).await;
            (ops.len() == keep_alive + 1).then_some(ops)
        }
    })
    .await;
    let claimed = ops.iter().find(|o| o.name_any() == bound).expect("bound op");
    assert_eq!(
        controller_owner(&claimed.metadata).map(|o| o.kind.as_str()),
        Some("Cache")
    );
    assert_eq!(owners_of_kind(&claimed.metadata, "Requirement").count(), 1);

    // Hand the Operation back, then let a new Requirement pick from the pool
    api.delete("cached-requirement", &DeleteParams::default())
        .await
        .expect("failed to delete requirement");
    wait_for_deleted(&api, "cached-requirement").await;

    let cache_name = Cache::name_for_key(&key);
    let prior_pool = wait_for("released Operation back in the pool", PHASE_TIMEOUT, || {
        let caches = caches.clone();
        let cache_name = cache_name.clone();
        let bound = bound.clone();
        async move {
            let cache = caches.get(&cache_name).await.ok()?;
            let pool = pool_of(&cache);
            pool.contains(&bound).then_some(pool)
        }
    })
    .await;

    api.create(
        &PostParams::default(),
        &sample_requirement("cached-requirement-new", true),
    )
    .await
    .expect("failed to create requirement");
    let reused = wait_for_phase(&api, "cached-requirement-new", RequirementPhase::Ready).await;
    let status = reused.status.expect("status");
    assert!(conditions::is_true(&status.conditions, types::OPERATION_READY));
    let acquired = conditions::find(&status.conditions, types::CACHED_OP_ACQUIRED)
        .expect("CachedOpAcquired condition");
    assert_eq!(acquired.reason, reasons::CACHE_HIT);

    let taken = status.operation_name.expect("operation bound");
    assert!(prior_pool.contains(&taken), "{taken} should come from the pool");
    wait_for("claimed Operation to leave the pool", PHASE_TIMEOUT, || {
        let caches = caches.clone();
        let cache_name = cache_name.clone();
        let taken = taken.clone();
        async move {
            let cache = caches.get(&cache_name).await.ok()?;
            (!pool_of(&cache).contains(&taken)).then_some(())
        }
    })
    .await;

    cleanup_namespace(&client, &ns).await;
}

/// Story: five developers ask for the same environment while only three
/// warm Operations exist
///
/// Expected behavior:
/// - exactly three Requirements reach Ready through a cache hit
/// - the other two wait in CacheChecking on NoOperationAvailable
/// - once the Cache refills, the waiting two become Ready as well
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_concurrent_claimants_share_a_small_pool() {
    let (client, ns) = setup("contention").await;
    let workloads = FakeWorkloadControllers::start(client.clone(), &ns);
    let caches: Api<Cache> = Api::namespaced(client.clone(), &ns);
    let api: Api<Requirement> = Api::namespaced(client.clone(), &ns);

    // Warm a pool of three before any Requirement exists
    let key = cache_key(&sample_template()).expect("cache key");
    let cache_name = Cache::name_for_key(&key);
    caches
        .create(
            &PostParams::default(),
            &Cache::new(
                &cache_name,
                CacheSpec {
                    template: sample_template(),
                    keep_alive_count: 3,
                    keep_alive_duration: "30m".to_string(),
                },
            ),
        )
        .await
        .expect("failed to create cache");
    let ops_client = client.clone();
    let ops_ns = ns.clone();
    wait_for("three warm Operations", PHASE_TIMEOUT, || {
        let client = ops_client.clone();
        let ns = ops_ns.clone();
        async move {
            let ops = operations_in(&client, &ns).await;
            (ops.len() == 3 && ops.iter().all(|o| o.is_ready())).then_some(())
        }
    })
    .await;
    workloads.pause_refill();

    let _controller = start_controller(client.clone(), &ns);
    let names: Vec<String> = (0..5).map(|i| format!("contender-{i}")).collect();
    for name in &names {
        api.create(&PostParams::default(), &sample_requirement(name, true))
            .await
            .expect("failed to create requirement");
    }

    let settled = wait_for("three Ready and two waiting", PHASE_TIMEOUT, || {
        let api = api.clone();
        async move {
            let reqs = api.list(&ListParams::default()).await.ok()?.items;
            let ready = reqs.iter().filter(|r| r.phase() == RequirementPhase::Ready).count();
            let waiting = reqs
                .iter()
                .filter(|r| r.phase() == RequirementPhase::CacheChecking)
                .filter(|r| {
                    r.status.as_ref().is_some_and(|s| {
                        conditions::find(&s.conditions, types::CACHED_OP_ACQUIRED).is_some_and(
                            |c| {
                                c.status == ConditionStatus::False
                                    && c.reason == reasons::NO_OPERATION_AVAILABLE
                            },
                        )
                    })
                })
                .count();
            (ready == 3 && waiting == 2).then_some(reqs)
        }
    })
    .await;

    let mut bound: Vec<String> = settled
        .iter()
        .filter_map(|r| r.status.as_ref()?.operation_name.clone())
        .collect();
    bound.sort();
    bound.dedup();
    assert_eq!(bound.len(), 3, "each Ready Requirement holds its own Operation");
    for op in operations_in(&client, &ns).await {
        assert!(
            owners_of_kind(&op.metadata, "Requirement").count() <= 1,
            "{} has more than one claimant",
            op.name_any()
        );
    }

    // Still waiting after a few more polls with an empty pool
    sleep(Duration::from_secs(5)).await;
    let still_waiting = api
        .list(&ListParams::default())
        .await
        .expect("failed to list requirements")
        .items
        .iter()
        .filter(|r| r.phase() == RequirementPhase::CacheChecking)
        .count();
    assert_eq!(still_waiting, 2);

    workloads.resume_refill();
    for name in &names {
        wait_for_phase(&api, name, RequirementPhase::Ready).await;
    }

    cleanup_namespace(&client, &ns).await;
}

/// Story: an unchanged Requirement is re-reconciled without touching its
/// condition timestamps
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_resync_preserves_condition_timestamps() {
    let (client, ns) = setup("resync").await;
    let _controller = start_controller(client.clone(), &ns);
    let _workloads = FakeWorkloadControllers::start(client.clone(), &ns);
    let api: Api<Requirement> = Api::namespaced(client.clone(), &ns);

    api.create(&PostParams::default(), &sample_requirement("steady", false))
        .await
        .expect("failed to create requirement");
    let ready = wait_for_phase(&api, "steady", RequirementPhase::Ready).await;
    let before = ready.status.expect("status").conditions;

    // A metadata-only change triggers a reconcile without a spec change
    let touch = serde_json::json!({
        "metadata": { "annotations": { "devinfra.goms.io/touched": "true" } }
    });
    api.patch("steady", &PatchParams::default(), &Patch::Merge(&touch))
        .await
        .expect("failed to annotate requirement");
    sleep(Duration::from_secs(3)).await;

    let after = api.get("steady").await.expect("get requirement");
    assert_eq!(after.phase(), RequirementPhase::Ready);
    assert_eq!(after.status.expect("status").conditions, before);

    cleanup_namespace(&client, &ns).await;
}

/// Story: deleting a cache-hit Requirement returns its Operation to the pool
///
/// Expected behavior:
/// - the Requirement's owner reference is removed before the finalizer goes
/// - the Cache stays the controller owner
/// - the Operation stays Ready and transferable for the next claimant
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_deletion_returns_operation_to_pool() {
    let (client, ns) = setup("release").await;
    let _controller = start_controller(client.clone(), &ns);
    let _workloads = FakeWorkloadControllers::start(client.clone(), &ns);
    let api: Api<Requirement> = Api::namespaced(client.clone(), &ns);
    let operations: Api<Operation> = Api::namespaced(client.clone(), &ns);

    // The first Requirement creates the Cache; the second gets a true cache hit
    api.create(&PostParams::default(), &sample_requirement("warmup", true))
        .await
        .expect("failed to create requirement");
    wait_for_phase(&api, "warmup", RequirementPhase::Ready).await;
    api.create(&PostParams::default(), &sample_requirement("hit", true))
        .await
        .expect("failed to create requirement");
    let ready = wait_for_phase(&api, "hit", RequirementPhase::Ready).await;
    let status = ready.status.expect("status");
    let acquired = conditions::find(&status.conditions, types::CACHED_OP_ACQUIRED)
        .expect("CachedOpAcquired condition");
    assert_eq!(acquired.reason, reasons::CACHE_HIT);
    let op_name = status.operation_name.expect("operation bound");

    api.delete("hit", &DeleteParams::default())
        .await
        .expect("failed to delete requirement");
    wait_for_deleted(&api, "hit").await;

    let op = operations.get(&op_name).await.expect("Operation should survive");
    assert_eq!(owners_of_kind(&op.metadata, "Requirement").count(), 0);
    assert_eq!(
        controller_owner(&op.metadata).map(|o| o.kind.as_str()),
        Some("Cache")
    );
    assert!(op.is_ready());
    assert!(op.is_transferable());

    cleanup_namespace(&client, &ns).await;
}
