use anyhow::Result;
use clap::Parser;
use mountpoint_csi_operator::config::Config;
use mountpoint_csi_operator::operator::Operator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();
    Operator::new(config).run().await
}
