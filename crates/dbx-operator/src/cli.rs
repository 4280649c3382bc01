//! Command-line flags and the configuration built from them

use std::collections::BTreeMap;
use std::time::Duration;

use clap::Parser;
use zeroize::Zeroizing;

use dbx_common::telemetry::TelemetryConfig;
use dbx_job::{ClusterDefaults, JobControllerConfig};
use dbx_platform::DatabricksConfig;

/// Databricks operator - runs DatabricksJob resources as Databricks runs
#[derive(Parser)]
#[command(name = "databricks-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print the DatabricksJob CRD manifest and exit
    #[arg(long)]
    pub crd: bool,

    /// Server-side apply the CRD before starting the controller
    #[arg(long, env = "DBX_INSTALL_CRD")]
    pub install_crd: bool,

    /// Workspace URL, e.g. https://adb-123.azuredatabricks.net
    #[arg(long, env = "DATABRICKS_HOST", required_unless_present = "crd")]
    pub databricks_host: Option<String>,

    /// Personal access token
    #[arg(
        long,
        env = "DATABRICKS_TOKEN",
        hide_env_values = true,
        required_unless_present = "crd"
    )]
    pub databricks_token: Option<Zeroizing<String>>,

    /// Timeout for a single Databricks API request in seconds
    #[arg(long, env = "DBX_REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Interval between run state refreshes in seconds
    #[arg(long, env = "DBX_REFRESH_INTERVAL_SECS", default_value = "30")]
    pub refresh_interval_secs: u64,

    /// Wait between cancelling and deleting a run in seconds
    #[arg(long, env = "DBX_CANCEL_GRACE_PERIOD_SECS", default_value = "10")]
    pub cancel_grace_period_secs: u64,

    /// Principal granted MANAGE on created secret scopes
    #[arg(long, env = "DBX_SECRET_SCOPE_PRINCIPAL", default_value = "users")]
    pub secret_scope_principal: String,

    /// Runtime version for new clusters that do not set one
    #[arg(long, env = "DBX_DEFAULT_SPARK_VERSION", default_value = "5.2.x-scala2.11")]
    pub default_spark_version: String,

    /// Node type for new clusters that do not set one
    #[arg(long, env = "DBX_DEFAULT_NODE_TYPE", default_value = "Standard_DS3_v2")]
    pub default_node_type: String,

    /// Worker count for new clusters that set neither workers nor autoscale
    #[arg(long, env = "DBX_DEFAULT_NUM_WORKERS", default_value = "3")]
    pub default_num_workers: i32,

    /// Default Spark environment variable (KEY=VALUE), repeatable; replaces
    /// the built-in PYSPARK_PYTHON default when given
    #[arg(long = "default-spark-env", value_parser = parse_key_value)]
    pub default_spark_env: Vec<(String, String)>,

    /// OTLP gRPC endpoint for trace export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Human-readable log lines instead of JSON
    #[arg(long, env = "DBX_PLAIN_LOGS")]
    pub plain_logs: bool,

    /// Pod name (downward API)
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Pod namespace (downward API)
    #[arg(long, env = "POD_NAMESPACE")]
    pub pod_namespace: Option<String>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE pair '{s}'")),
    }
}

impl Cli {
    /// Controller settings from the flags
    pub fn job_config(&self) -> JobControllerConfig {
        let mut cluster_defaults = ClusterDefaults {
            spark_version: self.default_spark_version.clone(),
            node_type_id: self.default_node_type.clone(),
            num_workers: self.default_num_workers,
            ..Default::default()
        };
        if !self.default_spark_env.is_empty() {
            cluster_defaults.spark_env_vars =
                self.default_spark_env.iter().cloned().collect::<BTreeMap<_, _>>();
        }

        JobControllerConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            cancel_grace_period: Duration::from_secs(self.cancel_grace_period_secs),
            secret_scope_principal: self.secret_scope_principal.clone(),
            cluster_defaults,
            ..Default::default()
        }
    }

    /// Platform client settings; takes the token out of the flags
    pub fn platform_config(&mut self) -> anyhow::Result<DatabricksConfig> {
        let host = self
            .databricks_host
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--databricks-host is required"))?;
        let mut token = self
            .databricks_token
            .take()
            .ok_or_else(|| anyhow::anyhow!("--databricks-token is required"))?;
        let config = DatabricksConfig::new(host, std::mem::take(&mut *token))?;
        Ok(config.with_request_timeout(Duration::from_secs(self.request_timeout_secs)))
    }

    /// Logging and tracing settings
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            otlp_endpoint: self.otlp_endpoint.clone(),
            json_logs: !self.plain_logs,
            pod_name: self.pod_name.clone(),
            pod_namespace: self.pod_namespace.clone(),
            ..Default::default()
        }
    }
}
