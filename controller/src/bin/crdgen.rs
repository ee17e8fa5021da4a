use anyhow::Result;
use clap::Parser;
use mountpoint_csi_operator::config::Config;
use mountpoint_csi_operator::operator::Operator;

/// Standalone CRD-manifest-generation entrypoint (§3.1 schema surface): emits the
/// `BucketPodAttachment` CRD as YAML without requiring a live cluster connection.
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();
    Operator::new(config).generate_crds()
}
