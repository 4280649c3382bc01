//! Databricks Operator - runs DatabricksJob resources on a Databricks workspace

use std::sync::Arc;

use clap::Parser;
use kube::Client;

use dbx_common::telemetry::init_telemetry;
use dbx_operator::cli::Cli;
use dbx_operator::controller_runner::build_job_controller;
use dbx_operator::crd::{ensure_crd_installed, job_crd_yaml};
use dbx_platform::HttpDatabricksClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // kube and reqwest both negotiate TLS through rustls; the process-wide
    // provider must be in place before either builds a client
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install rustls crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let mut cli = Cli::parse();

    if cli.crd {
        println!("{}", job_crd_yaml()?);
        return Ok(());
    }

    init_telemetry(cli.telemetry_config())?;

    let job_config = cli.job_config();
    job_config.validate()?;
    let platform_config = cli.platform_config()?;
    tracing::info!(host = %platform_config.host, "using Databricks workspace");
    let platform = Arc::new(HttpDatabricksClient::new(&platform_config)?);

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if cli.install_crd {
        ensure_crd_installed(&client).await?;
    }

    tracing::info!("Starting controllers");
    build_job_controller(client, platform, job_config).await;
    tracing::info!("Controllers stopped");
    Ok(())
}
