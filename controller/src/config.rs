use clap::Parser;
use std::time::Duration;

/// Driver-level configuration (§6.3): recognized CLI options, others are ignored by `clap`'s
/// derive machinery naturally refusing unknown flags.
#[derive(Debug, Clone, Parser)]
#[non_exhaustive]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Namespace in which Mounter Pods are created.
    #[arg(long, default_value = "kube-system")]
    pub mounter_namespace: String,
    /// Version string of the mount binary, populates a label only.
    #[arg(long, default_value = "unknown")]
    pub mountpoint_version: String,
    /// Driver version, populates a label only.
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    pub driver_version: String,
    /// Image reference for the mount binary's main container.
    #[arg(long, default_value = "public.ecr.aws/mountpoint-s3/mount-s3:latest")]
    pub mount_image: String,
    /// Pull policy for [`Self::mount_image`].
    #[arg(long, default_value = "IfNotPresent")]
    pub mount_image_pull_policy: String,
    /// Entry command run in the Mounter Pod's main container.
    #[arg(long, value_delimiter = ',', default_value = "mount-s3")]
    pub mount_entry_command: Vec<String>,
    /// Priority class assigned to Mounter Pods.
    #[arg(long, default_value = "")]
    pub priority_class_name: String,
    /// Optional preempting priority class, used instead of [`Self::priority_class_name`] when set.
    #[arg(long)]
    pub preempting_priority_class_name: Option<String>,
    /// Image used for headroom (reservation) pods.
    ///
    /// Accepted and stored but not exercised by the reconcile loop (§9 Open Questions).
    #[arg(long)]
    pub headroom_pod_image: Option<String>,
    /// Priority class used for headroom pods.
    #[arg(long)]
    pub headroom_pod_priority_class_name: Option<String>,
    /// Name of the secret carrying a custom CA bundle. Enables the TLS init-container (§4.2.2).
    #[arg(long)]
    pub tls_ca_secret_name: Option<String>,
    /// Image for the TLS init-container.
    #[arg(long, default_value = "public.ecr.aws/amazonlinux/amazonlinux:2023")]
    pub tls_init_image: String,
    /// Pull policy for [`Self::tls_init_image`].
    #[arg(long, default_value = "IfNotPresent")]
    pub tls_init_image_pull_policy: String,
    /// CPU request/limit for the TLS init-container, Kubernetes quantity syntax.
    #[arg(long, default_value = "50m")]
    pub tls_init_cpu: String,
    /// Memory request/limit for the TLS init-container, Kubernetes quantity syntax.
    #[arg(long, default_value = "64Mi")]
    pub tls_init_memory: String,
    /// Platform variant; toggles the explicit user-ID field in the Mounter Pod's security context.
    #[arg(long, default_value = "standard")]
    pub platform: PlatformVariant,
    /// Whether to apply and wait for the BucketPodAttachment CRD at startup.
    #[arg(long, default_value = "true")]
    pub manage_crd: bool,
    /// Address the ambient `/metrics` and `/healthz` HTTP server binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,
    /// Interval between stale-attachment cleaner passes, in seconds.
    #[arg(long, default_value = "120", value_parser = seconds_parser)]
    pub cleaner_interval: Duration,
    /// Age a dead workload's attachment must reach before the cleaner drops it, in seconds.
    #[arg(long, default_value = "120", value_parser = seconds_parser)]
    pub stale_threshold: Duration,
}

/// Platform variant a Mounter Pod is built for.
#[allow(clippy::exhaustive_enums)] // it is clear that this enum is exhaustive
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum PlatformVariant {
    /// The common case: the explicit numeric user ID is set in the security context.
    Standard,
    /// Host platforms that enforce their own user-ID mapping; the explicit field is omitted.
    HostManagedUid,
}

/// Parse a `u64` count of seconds into a [`Duration`].
fn seconds_parser(value: &str) -> Result<Duration, String> {
    let secs: u64 = value.parse().map_err(|_| format!("not a valid seconds count: {value}"))?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod test {
    use super::Config;
    use clap::Parser;

    #[test]
    fn defaults_parse_from_binary_name_alone() {
        let config = Config::parse_from(["mountpoint-csi-operator"]);
        assert_eq!(config.mounter_namespace, "kube-system");
        assert!(config.tls_ca_secret_name.is_none());
        assert_eq!(config.cleaner_interval.as_secs(), 120);
    }

    #[test]
    fn tls_secret_flag_enables_tls() {
        let config = Config::parse_from([
            "mountpoint-csi-operator",
            "--tls-ca-secret-name",
            "my-ca",
        ]);
        assert_eq!(config.tls_ca_secret_name.as_deref(), Some("my-ca"));
    }
}
