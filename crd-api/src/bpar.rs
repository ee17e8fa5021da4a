// The `JsonSchema` and `CustomResource` macro generates codes that does not pass the clippy lint.
#![allow(clippy::str_to_string)]
#![allow(clippy::missing_docs_in_private_items)]

use garde::Validate;
use k8s_openapi::serde::{Deserialize, Serialize};
use kube::CustomResource;
use schemars::JsonSchema;
use std::collections::BTreeMap;

/// A Bucket-Pod Attachment Record.
///
/// Cluster-scoped; one instance exists per unique
/// `(node, persistent volume, credential fingerprint, mount option fingerprint)` tuple. Its
/// `mountpointPodAttachments` map is the source of truth the attachment reconciler and the
/// stale-attachment cleaner act on.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Validate)]
#[kube(
    group = "csi.storage.k8s.io",
    version = "v1alpha1",
    kind = "BucketPodAttachment",
    singular = "bucketpodattachment",
    plural = "bucketpodattachments",
    struct = "BucketPodAttachment",
    status = "BucketPodAttachmentStatus",
    shortname = "bpar",
    printcolumn = r#"{"name":"Node", "type":"string", "description":"The node this attachment is materialized on", "jsonPath":".spec.nodeName"}"#,
    printcolumn = r#"{"name":"Volume", "type":"string", "description":"The persistent volume being mounted", "jsonPath":".spec.persistentVolumeName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "description":"The attachment age", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BucketPodAttachmentSpec {
    /// The node on which this attachment is materialized.
    #[garde(length(min = 1))]
    pub node_name: String,
    /// The persistent volume being mounted.
    #[garde(length(min = 1))]
    pub persistent_volume_name: String,
    /// The opaque bucket identifier carried in the PV.
    #[garde(length(min = 1))]
    pub volume_id: String,
    /// A canonicalized, comma-joined mount-option string.
    #[serde(default)]
    #[garde(skip)]
    pub mount_options: String,
    /// Opaque scoping token for the credential-group this attachment is keyed to.
    ///
    /// The fingerprinting strategy itself is out of scope for this control plane (see
    /// DESIGN.md); this field only ever participates in the BPAR's identity, never in naming or
    /// hashing.
    #[serde(default)]
    #[garde(skip)]
    pub credential_fingerprint: String,
    /// Mounter-Pod name -> ordered sequence of workload attachments.
    ///
    /// Invariant: non-empty iff the BPAR itself should exist (enforced by the reconciler, not the
    /// schema, since the reconciler is what deletes an emptied BPAR).
    #[garde(skip)]
    pub mountpoint_pod_attachments: BTreeMap<String, Vec<WorkloadAttachment>>,
}

/// A single workload's attachment to a Mounter Pod.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct WorkloadAttachment {
    /// UID of the workload pod that requested this mount.
    #[garde(length(min = 1))]
    pub workload_pod_uid: String,
    /// Unix timestamp (seconds) at which this workload was attached.
    ///
    /// Monotonic within one Mounter-Pod's sequence (§3.1 invariant 4); the reconciler and cleaner
    /// never need to reorder a sequence, only filter it.
    #[garde(skip)]
    pub attachment_time: i64,
}

/// Observed status of a `BucketPodAttachment`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, Validate)]
#[serde(rename_all = "camelCase")]
#[schemars(rename_all = "camelCase")]
#[garde(allow_unvalidated)]
pub struct BucketPodAttachmentStatus {
    /// Number of Mounter Pods currently tracked by this BPAR.
    #[garde(skip)]
    pub mounter_pod_count: usize,
}

#[cfg(test)]
mod test {
    use super::{BucketPodAttachmentSpec, WorkloadAttachment};
    use garde::Validate;
    use std::collections::BTreeMap;

    fn spec_with_node(node_name: &str) -> BucketPodAttachmentSpec {
        let mut attachments = BTreeMap::new();
        attachments.insert(
            "mp-abc".to_owned(),
            vec![WorkloadAttachment {
                workload_pod_uid: "w1".to_owned(),
                attachment_time: 0,
            }],
        );
        BucketPodAttachmentSpec {
            node_name: node_name.to_owned(),
            persistent_volume_name: "pv1".to_owned(),
            volume_id: "bucket-1".to_owned(),
            mount_options: String::new(),
            credential_fingerprint: String::new(),
            mountpoint_pod_attachments: attachments,
        }
    }

    #[test]
    fn validation_ok() {
        let ok = spec_with_node("node-1");
        assert!(Validate::validate(&ok, &()).is_ok());
    }

    #[test]
    fn validation_rejects_empty_node_name() {
        let bad = spec_with_node("");
        assert!(Validate::validate(&bad, &())
            .unwrap_err()
            .to_string()
            .contains("node_name"));
    }
}
