//! CRD manifest generation and installation

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use dbx_common::crd::DatabricksJob;
use dbx_common::{Error, LABEL_MANAGED_BY, LABEL_MANAGED_BY_OPERATOR};

/// Field manager for the CRD server-side apply
const CRD_FIELD_MANAGER: &str = "databricks-operator";

/// The DatabricksJob CRD, labelled as managed by this operator
pub fn job_crd() -> CustomResourceDefinition {
    let mut crd = DatabricksJob::crd();
    crd.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(
            LABEL_MANAGED_BY.to_string(),
            LABEL_MANAGED_BY_OPERATOR.to_string(),
        );
    crd
}

/// The CRD rendered as YAML
pub fn job_crd_yaml() -> Result<String, Error> {
    serde_yaml::to_string(&job_crd())
        .map_err(|e| Error::serialization_for_kind("CustomResourceDefinition", e.to_string()))
}

/// Install or update the CRD with server-side apply
///
/// Keeps the installed schema in step with the running operator version.
pub async fn ensure_crd_installed(client: &Client) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CRD_FIELD_MANAGER).force();

    tracing::info!(crd = %DatabricksJob::crd_name(), "installing CRD");
    crds.patch(DatabricksJob::crd_name(), &params, &Patch::Apply(&job_crd()))
        .await?;
    Ok(())
}
