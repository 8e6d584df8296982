//! Test helpers for integration tests
//!
//! Provides the kind cluster, an in-process Requirement controller, and a
//! stand-in for the external Operation and Cache controllers.

use std::collections::BTreeMap;
use std::future::Future;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Client, Config, ResourceExt};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use devinfra_common::crd::{
    Application, Cache, JobTemplate, Operation, OperationSpec, Requirement, RequirementPhase,
    RequirementSpec, CACHE_KEY_LABEL, CACHE_NAME_PREFIX,
};
use devinfra_common::kube_utils::{controller_owner, owner_reference, owners_of_kind, random_suffix};
use devinfra_operator::config::ControllerArgs;
use devinfra_operator::controller_runner::build_requirement_controller;
use devinfra_operator::startup::ensure_crds_installed;

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "devinfra-integration-test";

/// Deadline for a Requirement to reach a phase
pub const PHASE_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Global lock to ensure cluster is created only once
static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Track if CRDs have been installed (async-safe)
static CRDS_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Check if a kind cluster with the given name exists
pub fn kind_cluster_exists(name: &str) -> bool {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .expect("failed to run kind");

    let clusters = String::from_utf8_lossy(&output.stdout);
    clusters.lines().any(|line| line.trim() == name)
}

/// Create a kind cluster for testing
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name) {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

/// Create a Kubernetes client connected to the test cluster
pub async fn create_test_client() -> Result<Client, String> {
    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(format!("kind-{TEST_CLUSTER_NAME}")),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster exists and has the devinfra CRDs
///
/// Returns a fresh Client for each call; clients are not shared across tests.
pub async fn ensure_test_cluster() -> Result<Client, String> {
    CLUSTER_INIT
        .get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME))
        .clone()?;

    let client = create_test_client().await?;

    CRDS_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            ensure_crds_installed(&client)
                .await
                .map_err(|e| format!("failed to install CRDs: {e}"))?;
            // Give the API server a moment to establish the new types
            sleep(Duration::from_secs(2)).await;
            Ok(())
        })
        .await
        .clone()?;

    Ok(client)
}

/// Create a uniquely named namespace for one test
pub async fn create_test_namespace(client: &Client, prefix: &str) -> String {
    let name = format!("{prefix}-{}", random_suffix(5));
    let namespaces: Api<Namespace> = Api::all(client.clone());
    namespaces
        .create(
            &PostParams::default(),
            &Namespace {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .await
        .expect("failed to create namespace");
    name
}

/// Delete every Requirement, wait for their finalizers, then drop the namespace.
///
/// Must run while the controller is still alive.
pub async fn cleanup_namespace(client: &Client, namespace: &str) {
    let requirements: Api<Requirement> = Api::namespaced(client.clone(), namespace);
    let _ = requirements
        .delete_collection(&DeleteParams::default(), &ListParams::default())
        .await;
    let api = &requirements;
    wait_for("requirements to be finalized", PHASE_TIMEOUT, move || async move {
        match api.list(&ListParams::default()).await {
            Ok(list) if list.items.is_empty() => Some(()),
            _ => None,
        }
    })
    .await;

    let namespaces: Api<Namespace> = Api::all(client.clone());
    let _ = namespaces.delete(namespace, &DeleteParams::default()).await;
}

/// Poll until `poll` yields a value, panicking after `timeout`
pub async fn wait_for<T, F, Fut>(description: &str, timeout: Duration, mut poll: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = poll().await {
            return value;
        }
        if start.elapsed() > timeout {
            panic!("timed out after {timeout:?} waiting for {description}");
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Wait for a Requirement to reach `phase` and return it
pub async fn wait_for_phase(
    api: &Api<Requirement>,
    name: &str,
    phase: RequirementPhase,
) -> Requirement {
    wait_for(&format!("{name} to reach {phase}"), PHASE_TIMEOUT, move || async move {
        api.get_opt(name)
            .await
            .ok()
            .flatten()
            .filter(|r| r.phase() == phase)
    })
    .await
}

/// Wait for an object to disappear from the API
pub async fn wait_for_deleted<K>(api: &Api<K>, name: &str)
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    wait_for(&format!("{name} to be deleted"), PHASE_TIMEOUT, move || async move {
        matches!(api.get_opt(name).await, Ok(None)).then_some(())
    })
    .await
}

/// The Operation template every test uses unless it needs its own
pub fn sample_template() -> OperationSpec {
    OperationSpec {
        applications: vec![Application {
            name: "postgres".to_string(),
            provision: JobTemplate {
                image: "postgres:16".to_string(),
                env: BTreeMap::from([("POSTGRES_DB".to_string(), "app".to_string())]),
                ..Default::default()
            },
            teardown: Some(JobTemplate {
                image: "postgres:16".to_string(),
                args: vec!["--drop".to_string()],
                ..Default::default()
            }),
        }],
    }
}

/// A Requirement for [`sample_template`]
pub fn sample_requirement(name: &str, enable_cache: bool) -> Requirement {
    Requirement::new(
        name,
        RequirementSpec {
            template: sample_template(),
            enable_cache,
            cache_spec: None,
        },
    )
}

/// In-process Requirement controller, aborted on drop
pub struct ControllerGuard(JoinHandle<()>);

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the Requirement controller scoped to `namespace`
pub fn start_controller(client: Client, namespace: &str) -> ControllerGuard {
    let args = ControllerArgs {
        workers: 4,
        reconcile_timeout_secs: 30,
        default_keep_alive_count: 1,
        default_keep_alive_duration: "30m".to_string(),
        skip_crd_install: true,
        namespace: Some(namespace.to_string()),
    };
    ControllerGuard(tokio::spawn(build_requirement_controller(client, &args)))
}

/// Stand-in for the external Operation and Cache controllers.
///
/// Marks every Operation Ready (transferable when a Cache controls it) and
/// keeps each Cache's pool at `keepAliveCount` unclaimed Operations.
/// Refill can be paused to hold a pool empty.
pub struct FakeWorkloadControllers {
    handle: JoinHandle<()>,
    refill: Arc<AtomicBool>,
}

impl FakeWorkloadControllers {
    /// Start reconciling Operations and Caches in `namespace`
    pub fn start(client: Client, namespace: &str) -> Self {
        let refill = Arc::new(AtomicBool::new(true));
        let flag = refill.clone();
        let namespace = namespace.to_string();
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = sync_once(&client, &namespace, flag.load(Ordering::SeqCst)).await {
                    println!("fake workload controller: {e}");
                }
                sleep(POLL_INTERVAL).await;
            }
        });
        Self { handle, refill }
    }

    /// Stop creating new pool members
    pub fn pause_refill(&self) {
        self.refill.store(false, Ordering::SeqCst);
    }

    /// Resume creating pool members
    pub fn resume_refill(&self) {
        self.refill.store(true, Ordering::SeqCst);
    }
}

impl Drop for FakeWorkloadControllers {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn sync_once(client: &Client, namespace: &str, refill: bool) -> anyhow::Result<()> {
    let operations: Api<Operation> = Api::namespaced(client.clone(), namespace);
    let caches: Api<Cache> = Api::namespaced(client.clone(), namespace);
    let params = PatchParams::default();

    let ops = operations.list(&ListParams::default()).await?.items;
    for op in &ops {
        if op.metadata.deletion_timestamp.is_some() || op.is_ready() {
            continue;
        }
        let pooled = controller_owner(&op.metadata).is_some_and(|o| o.kind == "Cache");
        let status = serde_json::json!({
            "status": {
                "phase": "Ready",
                "ownerTransferable": pooled,
                "readyTime": Utc::now(),
            }
        });
        operations
            .patch_status(&op.name_any(), &params, &Patch::Merge(&status))
            .await?;
    }

    for cache in caches.list(&ListParams::default()).await?.items {
        let Some(uid) = cache.uid() else { continue };
        let key = cache
            .name_any()
            .strip_prefix(CACHE_NAME_PREFIX)
            .unwrap_or_default()
            .to_string();

        let mut pool: Vec<String> = ops
            .iter()
            .filter(|op| op.metadata.deletion_timestamp.is_none())
            .filter(|op| controller_owner(&op.metadata).is_some_and(|o| o.uid == uid))
            .filter(|op| owners_of_kind(&op.metadata, "Requirement").next().is_none())
            .map(|op| op.name_any())
            .collect();

        while refill && (pool.len() as u32) < cache.spec.keep_alive_count {
            let mut op = Operation::new(
                &format!("{key}-{}", random_suffix(5)),
                cache.spec.template.clone(),
            );
            op.metadata.namespace = Some(namespace.to_string());
            op.metadata.labels = Some(BTreeMap::from([(CACHE_KEY_LABEL.to_string(), key.clone())]));
            op.metadata.owner_references = Some(vec![owner_reference(&cache, true)?]);
            let created = operations.create(&PostParams::default(), &op).await?;
            pool.push(created.name_any());
        }

        pool.sort();
        let status = serde_json::json!({
            "status": {
                "cacheKey": key,
                "keepAliveCount": cache.spec.keep_alive_count,
                "operations": pool,
            }
        });
        caches
            .patch_status(&cache.name_any(), &params, &Patch::Merge(&status))
            .await?;
    }
    Ok(())
}
