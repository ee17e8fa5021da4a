//! The label/annotation wire contract carried on every Mounter Pod (§6.1).
//!
//! These are load-bearing: the reconciler selects owned Mounter Pods by the labels below, and
//! external tooling (monitoring selectors, the node-service) may key off them too, so they must
//! never change shape without a version bump.

/// Version string of the mount binary baked into the Mounter Pod's image.
pub const LABEL_MOUNTPOINT_VERSION: &str = "csi.storage.k8s.io/mountpoint-version";
/// Driver version that spawned the pod.
pub const LABEL_DRIVER_VERSION: &str = "csi.storage.k8s.io/mounted-by-csi-driver-version";
/// UID of the first workload that attached to this Mounter Pod (debugging aid only).
pub const LABEL_POD_UID: &str = "csi.storage.k8s.io/pod-uid";
/// Name of the persistent volume this Mounter Pod mounts.
pub const LABEL_VOLUME_NAME: &str = "csi.storage.k8s.io/volume-name";

/// Annotation instructing a Mounter Pod's in-pod runner to unmount and exit cleanly.
pub const ANNOTATION_NEEDS_UNMOUNT: &str = "csi.storage.k8s.io/needs-unmount";
/// Value written alongside [`ANNOTATION_NEEDS_UNMOUNT`].
pub const ANNOTATION_NEEDS_UNMOUNT_VALUE: &str = "true";
