//! Mounter-Pod naming & hashing (§4.1).

use sha2::{Digest, Sha224};

/// Prefix every Mounter-Pod name carries.
const NAME_PREFIX: &str = "mp-";

/// Derive the stable, collision-resistant name of the Mounter Pod serving `workload_uid`'s mount
/// of `persistent_volume_name`.
///
/// Stable: the same inputs always yield the same name, across reconciles and process restarts.
/// Collision-resistant: different inputs yield different names with overwhelming probability,
/// since the name is a 224-bit cryptographic digest of the inputs under a length-prefixed
/// encoding (`workload_uid`'s byte length, then `workload_uid`, then `persistent_volume_name`) —
/// plain concatenation would let `("ab", "cd")` and `("a", "bcd")` hash to the same bytes.
///
/// Changing the hash function or the input encoding is a breaking change: two control-plane
/// versions disagreeing on this function would each spawn their own Mounter Pod for the same
/// workload.
#[must_use]
pub fn mounter_pod_name(workload_uid: &str, persistent_volume_name: &str) -> String {
    let mut hasher = Sha224::new();
    hasher.update(workload_uid.len().to_le_bytes());
    hasher.update(workload_uid.as_bytes());
    hasher.update(persistent_volume_name.as_bytes());
    let digest = hasher.finalize();
    let mut name = String::with_capacity(NAME_PREFIX.len() + digest.len() * 2);
    name.push_str(NAME_PREFIX);
    for byte in digest {
        name.push_str(&format!("{byte:02x}"));
    }
    name
}

#[cfg(test)]
mod test {
    use super::mounter_pod_name;

    #[test]
    fn name_is_stable_across_calls() {
        let a = mounter_pod_name("workload-1", "pv-1");
        let b = mounter_pod_name("workload-1", "pv-1");
        assert_eq!(a, b);
    }

    #[test]
    fn name_differs_for_different_inputs() {
        let a = mounter_pod_name("workload-1", "pv-1");
        let b = mounter_pod_name("workload-2", "pv-1");
        let c = mounter_pod_name("workload-1", "pv-2");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn name_has_expected_shape() {
        let name = mounter_pod_name("workload-1", "pv-1");
        assert!(name.starts_with("mp-"));
        // 224 bits == 28 bytes == 56 hex characters
        assert_eq!(name.len(), "mp-".len() + 56);
        assert!(name["mp-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn length_prefix_disambiguates_equal_concatenations() {
        // Without the length prefix, these two calls would hash the identical byte stream
        // "abcd" and collide.
        let a = mounter_pod_name("ab", "cd");
        let b = mounter_pod_name("a", "bcd");
        assert_ne!(a, b);
    }
}
