use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing::{info, warn};

use crate::cleaner;
use crate::config::Config;
use crate::metrics;
use crate::reconcile::{self, Context};

/// Top-level wiring for the mounter-pod control plane: CRD bootstrap, the attachment reconciler,
/// the stale-attachment cleaner, and the ambient metrics/health server.
#[derive(Debug)]
pub struct Operator {
    /// Driver configuration.
    config: Config,
}

impl Operator {
    /// Construct an operator around the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the operator until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the Kubernetes client cannot be constructed, CRD bootstrap fails, or one
    /// of the long-lived tasks returns an error.
    pub async fn run(&self) -> Result<()> {
        let kube_client = Client::try_default().await?;
        crd_api::setup::set_up(&kube_client, self.config.manage_crd).await?;

        metrics::init();

        let ctx = Arc::new(Context {
            kube_client: kube_client.clone(),
            config: Arc::new(self.config.clone()),
        });

        let bpar_api: Api<crd_api::BucketPodAttachment> = Api::all(kube_client.clone());
        let pod_api: Api<Pod> = Api::namespaced(kube_client.clone(), &self.config.mounter_namespace);

        let graceful_shutdown = event_listener::Event::new();
        let forceful_shutdown = async {
            info!("press ctrl+c to shut down gracefully");
            let _first = tokio::signal::ctrl_c().await;
            graceful_shutdown.notify(usize::MAX);
            info!("graceful shutdown requested, press ctrl+c again to force shut down");
            let _second = tokio::signal::ctrl_c().await;
        };

        let controller = Controller::new(bpar_api, kube::runtime::watcher::Config::default())
            .owns(pod_api, kube::runtime::watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile::reconcile, reconcile::error_policy, ctx.clone())
            .for_each(|result| async move {
                if let Err(err) = result {
                    warn!(error = %err, "reconcile stream yielded an error");
                }
            });

        let cleaner_task = cleaner::run(ctx, graceful_shutdown.listen());
        let web_server = self.web_server();

        tokio::pin!(forceful_shutdown);
        tokio::pin!(controller);
        tokio::pin!(cleaner_task);
        tokio::pin!(web_server);

        let mut controller_done = false;
        let mut cleaner_done = false;
        let mut web_server_done = false;

        loop {
            tokio::select! {
                () = &mut forceful_shutdown => {
                    warn!("forceful shutdown");
                    break;
                }
                () = &mut controller, if !controller_done => {
                    controller_done = true;
                    info!("attachment reconciler graceful shutdown");
                }
                () = &mut cleaner_task, if !cleaner_done => {
                    cleaner_done = true;
                    info!("stale-attachment cleaner graceful shutdown");
                }
                res = &mut web_server, if !web_server_done => {
                    res?;
                    web_server_done = true;
                    info!("web server graceful shutdown");
                }
            }

            if controller_done && cleaner_done && web_server_done {
                break;
            }
        }

        Ok(())
    }

    /// Emit the `BucketPodAttachment` CRD as YAML, for out-of-band packaging (§3.1 schema
    /// surface). Requires no live cluster connection.
    pub fn generate_crds(&self) -> Result<()> {
        let crd = crd_api::BucketPodAttachment::crd();
        println!("{}", serde_yaml::to_string(&crd)?);
        Ok(())
    }

    /// Serve the `/metrics` and `/healthz` endpoints until ctrl-c.
    async fn web_server(&self) -> Result<()> {
        axum::Server::bind(&self.config.listen_addr.parse()?)
            .serve(crate::router::router().into_make_service())
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        Ok(())
    }
}
