use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::wait::{await_condition, conditions};
use kube::{Api, Client, CustomResourceExt};
use std::time::Duration;
use tracing::{debug, info};

use crate::BucketPodAttachment;

/// Field manager identifier used for all CRD-management server-side-apply calls.
const FIELD_MANAGER: &str = "csi.storage.k8s.io/bucket-pod-attachment-crd";

/// How long to wait for the CRD to reach the `Established` condition before giving up.
const CRD_ESTABLISH_TIMEOUT: Duration = Duration::from_secs(20);

/// Apply the `BucketPodAttachment` CRD if it is absent, then wait for it to become established.
///
/// A single version is managed; there is no migration machinery, since nothing in this control
/// plane's schema has ever needed more than one stored version (see DESIGN.md).
pub async fn set_up(kube_client: &Client, manage_crd: bool) -> anyhow::Result<()> {
    if !manage_crd {
        info!("crd management disabled, skip checking for the BucketPodAttachment CRD");
        return Ok(());
    }

    let crd_api: Api<CustomResourceDefinition> = Api::all(kube_client.clone());
    let definition = BucketPodAttachment::crd();

    debug!("applying BucketPodAttachment crd");
    let _crd: CustomResourceDefinition = crd_api
        .patch(
            BucketPodAttachment::crd_name(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Apply(definition),
        )
        .await?;

    wait_crd_established(crd_api).await
}

/// Wait until the given CRD reports the `Established` condition.
async fn wait_crd_established(crd_api: Api<CustomResourceDefinition>) -> anyhow::Result<()> {
    let establish = await_condition(
        crd_api,
        BucketPodAttachment::crd_name(),
        conditions::is_crd_established(),
    );
    tokio::time::timeout(CRD_ESTABLISH_TIMEOUT, establish).await??;
    Ok(())
}
