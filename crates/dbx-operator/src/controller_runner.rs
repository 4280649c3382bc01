//! Controller runner - builds the DatabricksJob controller future

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use dbx_common::crd::DatabricksJob;
use dbx_common::KubeEventPublisher;
use dbx_job::{error_policy, reconcile, JobContext, JobControllerConfig, KubeJobStore};
use dbx_platform::DatabricksApi;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Name reported on Events emitted by the controller
pub const CONTROLLER_NAME: &str = "databricks-job-controller";

/// Build the DatabricksJob controller future, watching all namespaces
pub fn build_job_controller(
    client: Client,
    platform: Arc<dyn DatabricksApi>,
    config: JobControllerConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(JobContext::new(
        Arc::new(KubeJobStore::new(client.clone())),
        platform,
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME)),
        config,
    ));
    let jobs: Api<DatabricksJob> = Api::all(client);

    tracing::info!("- DatabricksJob controller");

    Box::pin(
        Controller::new(jobs, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("DatabricksJob")),
    )
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
