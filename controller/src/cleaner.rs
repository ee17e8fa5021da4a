//! Stale-Attachment Cleaner (§4.5): a timer-driven safety net that removes workload entries
//! whose referenced workload pod no longer exists, and annotates orphaned Mounter Pods for
//! unmount.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crd_api::labels::{ANNOTATION_NEEDS_UNMOUNT, ANNOTATION_NEEDS_UNMOUNT_VALUE};
use crd_api::{BucketPodAttachment, WorkloadAttachment};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info};

use crate::consts::FIELD_MANAGER;
use crate::metrics;
use crate::reconcile::Context;

/// Run the cleaner loop until `shutdown` fires, ticking every `ctx.config.cleaner_interval`.
pub async fn run(ctx: Arc<Context>, shutdown: event_listener::EventListener) {
    let mut ticker = tokio::time::interval(ctx.config.cleaner_interval);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let start = Instant::now();
                if let Err(err) = run_pass(&ctx).await {
                    error!(error = %err, "stale-attachment cleaner pass failed");
                }
                metrics::observe_cleaner_pass(start.elapsed());
            }
            () = &mut shutdown => {
                info!("stale-attachment cleaner graceful shutdown");
                break;
            }
        }
    }
}

/// One sweep (§4.5 steps 1-4).
async fn run_pass(ctx: &Context) -> Result<(), kube::Error> {
    let live_uids = live_workload_uids(&ctx.kube_client).await?;
    let now = now_unix_secs();

    let bpar_api: Api<BucketPodAttachment> = Api::all(ctx.kube_client.clone());
    let pod_api: Api<Pod> = Api::namespaced(ctx.kube_client.clone(), &ctx.config.mounter_namespace);

    for bpar in bpar_api.list(&ListParams::default()).await?.items {
        prune_bpar(&bpar_api, &pod_api, &bpar, &live_uids, now, ctx.config.stale_threshold.as_secs() as i64)
            .await?;
    }
    Ok(())
}

/// Build the set of UIDs of every workload pod currently in the cluster.
async fn live_workload_uids(client: &Client) -> Result<HashSet<String>, kube::Error> {
    let pod_api: Api<k8s_openapi::api::core::v1::Pod> = Api::all(client.clone());
    let pods = pod_api.list(&ListParams::default()).await?;
    Ok(pods
        .items
        .into_iter()
        .filter_map(|p| p.metadata.uid)
        .collect())
}

/// Prune one BPAR's stale entries, annotating drained Mounter Pods and deleting an empty BPAR.
async fn prune_bpar(
    bpar_api: &Api<BucketPodAttachment>,
    pod_api: &Api<Pod>,
    bpar: &BucketPodAttachment,
    live_uids: &HashSet<String>,
    now: i64,
    stale_threshold_secs: i64,
) -> Result<(), kube::Error> {
    let mut remaining: BTreeMap<String, Vec<WorkloadAttachment>> = BTreeMap::new();
    let mut drained = Vec::new();

    for (mounter_pod_name, attachments) in &bpar.spec.mountpoint_pod_attachments {
        let kept: Vec<WorkloadAttachment> = attachments
            .iter()
            .filter(|a| keep(a, live_uids, now, stale_threshold_secs))
            .cloned()
            .collect();
        if kept.is_empty() && !attachments.is_empty() {
            drained.push(mounter_pod_name.clone());
        } else {
            let _previous = remaining.insert(mounter_pod_name.clone(), kept);
        }
    }

    if drained.is_empty() && remaining.len() == bpar.spec.mountpoint_pod_attachments.len() {
        return Ok(());
    }

    for mounter_pod_name in &drained {
        annotate_needs_unmount(pod_api, mounter_pod_name).await?;
    }

    if remaining.is_empty() {
        info!(bpar = bpar.name_any(), "cleaner draining last attachments, deleting bpar");
        bpar_api
            .delete(&bpar.name_any(), &DeleteParams::default())
            .await?;
        return Ok(());
    }

    let mut updated = bpar.clone();
    updated.spec.mountpoint_pod_attachments = remaining;
    let _applied: BucketPodAttachment = bpar_api
        .patch(
            &bpar.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Apply(&updated),
        )
        .await?;
    Ok(())
}

/// Whether a single workload attachment survives this sweep (§4.5 step 2).
fn keep(
    attachment: &WorkloadAttachment,
    live_uids: &HashSet<String>,
    now: i64,
    stale_threshold_secs: i64,
) -> bool {
    if live_uids.contains(&attachment.workload_pod_uid) {
        return true;
    }
    now - attachment.attachment_time <= stale_threshold_secs
}

/// Set `needs-unmount=true` on the named Mounter Pod, tolerating it already being gone.
async fn annotate_needs_unmount(pod_api: &Api<Pod>, mounter_pod_name: &str) -> Result<(), kube::Error> {
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                ANNOTATION_NEEDS_UNMOUNT: ANNOTATION_NEEDS_UNMOUNT_VALUE,
            }
        }
    });
    match pod_api
        .patch(
            mounter_pod_name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await
    {
        Ok(_pod) => {
            debug!(pod = mounter_pod_name, "annotated mounter pod for unmount");
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e),
    }
}

/// Current Unix time in seconds.
fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod test {
    use super::keep;
    use crd_api::WorkloadAttachment;
    use std::collections::HashSet;

    fn attachment(uid: &str, attachment_time: i64) -> WorkloadAttachment {
        WorkloadAttachment {
            workload_pod_uid: uid.to_owned(),
            attachment_time,
        }
    }

    #[test]
    fn live_uid_is_always_kept() {
        let live: HashSet<String> = ["w1".to_owned()].into_iter().collect();
        assert!(keep(&attachment("w1", 0), &live, 10_000, 120));
    }

    #[test]
    fn dead_and_stale_is_dropped() {
        let live = HashSet::new();
        assert!(!keep(&attachment("w1", 0), &live, 1_000, 120));
    }

    #[test]
    fn dead_but_recent_is_kept() {
        let live = HashSet::new();
        assert!(keep(&attachment("w1", 990), &live, 1_000, 120));
    }
}
