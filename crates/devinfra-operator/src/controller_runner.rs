//! Controller runner - builds the Requirement controller future
//!
//! Requirements are reconciled on changes to themselves, to any Operation
//! that references them, and to the Cache whose pool they are waiting on.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::{Action, Config as ControllerConfig};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use devinfra_common::crd::{Cache, Operation, Requirement};
use devinfra_requirement::watch::{requirements_for_cache, requirements_for_operation};
use devinfra_requirement::{error_policy, reconcile, Context};

use crate::config::ControllerArgs;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so the API server closes idle watches before the client times out.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Api scoped to one namespace, or cluster-wide when none is given
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Build the Requirement controller future
pub fn build_requirement_controller(
    client: Client,
    args: &ControllerArgs,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(
        Context::builder(client.clone())
            .config(args.reconcile_config())
            .build(),
    );
    let namespace = args.namespace.as_deref();
    let requirements: Api<Requirement> = scoped_api(&client, namespace);
    let operations: Api<Operation> = scoped_api(&client, namespace);
    let caches: Api<Cache> = scoped_api(&client, namespace);

    match namespace {
        Some(ns) => tracing::info!(namespace = %ns, workers = args.workers, "- Requirement controller"),
        None => tracing::info!(workers = args.workers, "- Requirement controller (all namespaces)"),
    }

    let controller = Controller::new(
        requirements,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let store = controller.store();

    Box::pin(
        controller
            .watches(
                operations,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                |op| requirements_for_operation(&op),
            )
            .watches(
                caches,
                WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
                move |cache| {
                    let affected = requirements_for_cache(&cache, &store.state());
                    if !affected.is_empty() {
                        tracing::debug!(
                            cache = %cache.metadata.name.as_deref().unwrap_or_default(),
                            affected_count = affected.len(),
                            "Cache changed, waking waiting requirements"
                        );
                    }
                    affected
                },
            )
            .with_config(ControllerConfig::default().concurrency(args.workers))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result),
    )
}

fn log_reconcile_result<E: std::fmt::Debug>(
    result: Result<(ObjectRef<Requirement>, Action), E>,
) -> std::future::Ready<()> {
    match result {
        Ok((obj, action)) => tracing::debug!(requirement = %obj, ?action, "reconciliation completed"),
        Err(e) => tracing::error!(error = ?e, "Requirement reconciliation error"),
    }
    std::future::ready(())
}
