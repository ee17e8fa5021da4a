//! The node-service <-> Mounter-Pod rendez-vous contract (§6.2).
//!
//! These constants are the one thing both sides of that boundary must agree on; the node-service
//! itself is out of scope for this control plane, but the path and sentinel names it expects are
//! part of this crate's wire contract all the same.

/// Path, inside the Mounter Pod, at which the communication emptyDir is mounted.
///
/// The external node-service mounts the same path from its own side to reach the Unix socket the
/// runner listens on.
pub const COMMUNICATION_DIR: &str = "/var/run/mount-rendezvous";
/// Volume name backing [`COMMUNICATION_DIR`].
pub const COMMUNICATION_VOLUME_NAME: &str = "communication";
/// Hard size cap on the communication volume (§4.2.1, §5).
pub const COMMUNICATION_VOLUME_SIZE_LIMIT: &str = "10Mi";

/// Sentinel file the runner writes, with stderr as its contents, when the mount attempt fails.
pub const SENTINEL_MOUNT_ERROR: &str = "mount.error";
/// Sentinel file the node-service writes to request a graceful unmount.
pub const SENTINEL_MOUNT_EXIT: &str = "mount.exit";
