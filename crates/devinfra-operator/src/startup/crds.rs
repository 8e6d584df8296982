//! CRD installation utilities
//!
//! The operator installs its own CRDs on startup using server-side apply so
//! the stored schemas always match the operator version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use devinfra_common::crd::{Cache, Operation, Requirement};
use devinfra_common::retry::{retry_with_backoff, RetryConfig};

/// Field manager for CRD server-side apply
const CRD_FIELD_MANAGER: &str = "devinfra-operator";

/// Attempts per CRD before startup gives up
const CRD_INSTALL_ATTEMPTS: u32 = 5;

/// All CRDs owned by the operator, in install order
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![Requirement::crd(), Cache::crd(), Operation::crd()]
}

/// Render every CRD as a multi-document YAML stream
pub fn crd_manifests() -> anyhow::Result<String> {
    let docs = all_crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))?;
    Ok(docs.join("---\n"))
}

/// Ensure all devinfra CRDs are installed/updated
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CRD_FIELD_MANAGER).force();
    let retry = RetryConfig::with_max_attempts(CRD_INSTALL_ATTEMPTS);

    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        let patch = Patch::Apply(&crd);
        tracing::info!(crd = %name, "installing CRD");
        retry_with_backoff(&retry, &format!("install CRD {name}"), || {
            crds.patch(&name, &params, &patch)
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("devinfra CRDs installed/updated");
    Ok(())
}
