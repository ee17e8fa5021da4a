//! Driver-wide constants: container naming, field manager, and timing defaults.

use std::time::Duration;

/// Field manager identifier used for every server-side-apply call this binary issues.
pub const FIELD_MANAGER: &str = "csi.storage.k8s.io/mounter-pod-controller";

/// Name of the Mounter Pod's main container.
pub const MAIN_CONTAINER_NAME: &str = "mounter";
/// Name of the TLS CA-bootstrap init container (§4.2.2).
pub const TLS_INIT_CONTAINER_NAME: &str = "install-ca-cert";

/// Volume name backing the projected CA-bundle secret.
pub const CA_SECRET_VOLUME_NAME: &str = "ca-bundle";
/// Key the CA bundle is expected under inside the named secret.
pub const CA_SECRET_KEY: &str = "ca-bundle.crt";
/// Volume name backing the shared, rebuilt system trust store.
pub const CA_CERTS_VOLUME_NAME: &str = "system-certs";
/// Path, inside both containers, of the system certificate directory.
pub const SYSTEM_CERTS_DIR: &str = "/etc/ssl/certs";
/// Path the projected CA-bundle secret is mounted at in the init container.
pub const CA_SECRET_MOUNT_DIR: &str = "/tmp/ca-bundle";

/// PV volume-attribute key naming a service account to run the Mounter Pod under (§6.4).
pub const VOLUME_ATTR_SERVICE_ACCOUNT: &str = "csi.storage.k8s.io/serviceAccountName";
/// PV volume-attribute key naming the main container's CPU request/limit (§6.4).
pub const VOLUME_ATTR_CPU: &str = "csi.storage.k8s.io/cpu";
/// PV volume-attribute key naming the main container's memory request/limit (§6.4).
pub const VOLUME_ATTR_MEMORY: &str = "csi.storage.k8s.io/memory";

/// Initial backoff applied to a reconcile that hit a transient error (§4.4 step 4).
pub const RECONCILE_ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Requeue interval used after a reconcile that made no changes.
pub const RECONCILE_IDLE_REQUEUE: Duration = Duration::from_secs(5 * 60);
