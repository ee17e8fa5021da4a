//! Attachment Reconciler (§4.4): the event-driven loop over `BucketPodAttachment` resources that
//! ensures Mounter Pods exist and are healthy, collapses completed pods, and deletes emptied
//! BPARs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crd_api::{BucketPodAttachment, WorkloadAttachment};
use k8s_openapi::api::core::v1::{PersistentVolume, Pod};
use kube::api::{ListParams, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::builder::{self, build_mounter_pod, VolumeAttributes};
use crate::config::Config;
use crate::consts::{FIELD_MANAGER, RECONCILE_ERROR_BACKOFF, RECONCILE_IDLE_REQUEUE};
use crate::metrics;

/// Shared state handed to every reconcile invocation.
pub struct Context {
    /// Kubernetes client.
    pub kube_client: Client,
    /// Driver configuration.
    pub config: Arc<Config>,
}

/// Errors the reconciler can hit. All are wrapped `kube::Error` variants — per §7 this control
/// plane never re-exports the client library's own error type to callers.
#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    /// A Kubernetes API call failed.
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    /// The Pod Spec Builder rejected a PV's volume attributes.
    #[error("failed to build mounter pod spec: {0}")]
    Builder(#[from] builder::BuilderError),
    /// The BPAR is missing a namespace-independent identity field it needs to be acted on.
    #[error("BucketPodAttachment missing required field {0}")]
    MissingField(&'static str),
}

/// `Result` alias scoped to this module.
type Result<T> = std::result::Result<T, ReconcileError>;

/// The reconciliation logic, registered with `kube::runtime::Controller::new(...).owns::<Pod>()`.
pub async fn reconcile(bpar: Arc<BucketPodAttachment>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let name = bpar.name_any();
    debug!(bpar = %name, "reconciling bucket pod attachment");

    let outcome = reconcile_inner(&bpar, &ctx).await;
    metrics::observe_reconcile(start.elapsed(), &outcome);

    outcome
}

/// The actual reconcile body, separated from [`reconcile`] only so duration/outcome metrics wrap
/// every return path (including early returns) in one place.
async fn reconcile_inner(bpar: &BucketPodAttachment, ctx: &Context) -> Result<Action> {
    let bpar_api: Api<BucketPodAttachment> = Api::all(ctx.kube_client.clone());
    let pod_api: Api<Pod> = Api::namespaced(ctx.kube_client.clone(), &ctx.config.mounter_namespace);

    let mut remaining: BTreeMap<String, Vec<WorkloadAttachment>> =
        bpar.spec.mountpoint_pod_attachments.clone();
    let mut changed = false;

    for (mounter_pod_name, attachments) in &bpar.spec.mountpoint_pod_attachments {
        if attachments.is_empty() {
            continue;
        }
        match pod_api.get_opt(mounter_pod_name).await? {
            None => {
                create_mounter_pod(&pod_api, bpar, mounter_pod_name, attachments, ctx).await?;
            }
            Some(pod) => match pod_phase(&pod).as_deref() {
                Some("Succeeded") => {
                    info!(pod = %mounter_pod_name, "mounter pod unmounted cleanly, reaping");
                    delete_if_present(&pod_api, mounter_pod_name).await?;
                    let _removed = remaining.remove(mounter_pod_name);
                    changed = true;
                }
                Some("Failed") => {
                    warn!(pod = %mounter_pod_name, "mounter pod failed, leaving for external retry policy");
                }
                _ => {}
            },
        }
    }

    if remaining.is_empty() {
        info!(bpar = bpar.name_any(), "all attachments drained, deleting bpar");
        bpar_api
            .delete(&bpar.name_any(), &kube::api::DeleteParams::default())
            .await?;
        return Ok(Action::await_change());
    }

    if changed {
        let mut updated = bpar.clone();
        updated.spec.mountpoint_pod_attachments = remaining;
        let _applied: BucketPodAttachment = bpar_api
            .patch(
                &bpar.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Apply(&updated),
            )
            .await?;
    }

    Ok(Action::requeue(RECONCILE_IDLE_REQUEUE))
}

/// Error policy (§4.4 step 4, §7): transient API errors get a bounded backoff requeue; permanent
/// validation errors (an unparseable quantity, a missing required field) are logged and left for
/// the next spec change to re-trigger reconciliation rather than spun on.
pub fn error_policy(bpar: Arc<BucketPodAttachment>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    error!(bpar = bpar.name_any(), error = %error, "reconcile failed");
    match error {
        ReconcileError::Kube(_) => Action::requeue(RECONCILE_ERROR_BACKOFF),
        ReconcileError::Builder(_) | ReconcileError::MissingField(_) => Action::await_change(),
    }
}

/// Create the Mounter Pod for `mounter_pod_name`, deriving node/service-account from the first
/// workload attachment, falling back to a minimal spec if the workload pod lookup fails.
async fn create_mounter_pod(
    pod_api: &Api<Pod>,
    bpar: &BucketPodAttachment,
    mounter_pod_name: &str,
    attachments: &[WorkloadAttachment],
    ctx: &Context,
) -> Result<()> {
    let first = attachments
        .first()
        .ok_or(ReconcileError::MissingField("mountpointPodAttachments[].workloadPodUid"))?;

    let workload_pod = find_workload_pod_by_uid(&ctx.kube_client, &first.workload_pod_uid).await;
    let workload_service_account = workload_pod
        .as_ref()
        .and_then(|p| p.spec.as_ref())
        .and_then(|s| s.service_account_name.as_deref());

    let attributes = find_pv_volume_attributes(&ctx.kube_client, &bpar.spec.persistent_volume_name)
        .await
        .unwrap_or_default();
    let service_account = builder::service_account_from_attributes(&attributes)
        .or(workload_service_account);

    let volume = VolumeAttributes {
        volume_id: bpar.spec.volume_id.clone(),
        mount_options: driver_api::Args::parse(
            bpar.spec.mount_options.split(',').filter(|s| !s.is_empty()),
        ),
        attributes,
    };

    let pod = build_mounter_pod(
        mounter_pod_name,
        bpar,
        &ctx.config.mounter_namespace,
        &bpar.spec.node_name,
        &first.workload_pod_uid,
        service_account,
        &volume,
        &ctx.config,
    )?;

    let _created: Pod = pod_api
        .patch(
            mounter_pod_name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Apply(&pod),
        )
        .await?;
    info!(pod = mounter_pod_name, node = bpar.spec.node_name, "created mounter pod");
    Ok(())
}

/// Best-effort lookup of a workload pod by UID, used only to derive node/service-account
/// overrides (§4.4 step 2). Returns `None` on any lookup failure rather than surfacing an error —
/// a failed lookup falls back to the BPAR's own `nodeName`.
async fn find_workload_pod_by_uid(client: &Client, uid: &str) -> Option<Pod> {
    let pod_api: Api<Pod> = Api::all(client.clone());
    let params = ListParams::default().fields(&format!("metadata.uid={uid}"));
    match pod_api.list(&params).await {
        Ok(list) => list.items.into_iter().next(),
        Err(err) => {
            debug!(uid, error = %err, "workload pod lookup failed, falling back to minimal spec");
            None
        }
    }
}

/// Best-effort lookup of a PV's volume attributes (§4.2.1, §6.4), used to derive CPU/memory
/// requests and an optional service-account override at pod-build time. `None` on any lookup
/// failure (including a not-yet-created or already-deleted PV) falls back to an empty map, which
/// the builder treats as "apply no overrides" rather than an error.
async fn find_pv_volume_attributes(client: &Client, pv_name: &str) -> Option<BTreeMap<String, String>> {
    let pv_api: Api<PersistentVolume> = Api::all(client.clone());
    match pv_api.get_opt(pv_name).await {
        Ok(pv) => pv
            .and_then(|pv| pv.spec)
            .and_then(|spec| spec.csi)
            .and_then(|csi| csi.volume_attributes),
        Err(err) => {
            debug!(pv = pv_name, error = %err, "persistent volume lookup failed, no volume attributes applied");
            None
        }
    }
}

/// Delete `name` if it is still present; tolerates a concurrent deletion.
async fn delete_if_present(pod_api: &Api<Pod>, name: &str) -> Result<()> {
    match pod_api.delete(name, &kube::api::DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// The pod's current phase, if reported.
fn pod_phase(pod: &Pod) -> Option<String> {
    pod.status.as_ref()?.phase.clone()
}

#[cfg(test)]
mod test {
    use super::pod_phase;
    use k8s_openapi::api::core::v1::{Pod, PodStatus};

    #[test]
    fn phase_defaults_to_none_without_status() {
        let pod = Pod::default();
        assert_eq!(pod_phase(&pod), None);
    }

    #[test]
    fn phase_reads_reported_value() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Succeeded".to_owned()),
                ..PodStatus::default()
            }),
            ..Pod::default()
        };
        assert_eq!(pod_phase(&pod).as_deref(), Some("Succeeded"));
    }
}
