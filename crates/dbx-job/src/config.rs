//! Controller settings
//!
//! Built once by the binary from CLI flags and passed in through the context;
//! nothing here reads the process environment.

use std::collections::BTreeMap;
use std::time::Duration;

use dbx_common::Error;

/// Values used for any cluster field a job leaves unset
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterDefaults {
    /// Runtime version
    pub spark_version: String,
    /// Worker node type
    pub node_type_id: String,
    /// Worker count
    pub num_workers: i32,
    /// Environment variables; job values win on key collisions
    pub spark_env_vars: BTreeMap<String, String>,
}

impl Default for ClusterDefaults {
    fn default() -> Self {
        Self {
            spark_version: "5.2.x-scala2.11".to_string(),
            node_type_id: "Standard_DS3_v2".to_string(),
            num_workers: 3,
            spark_env_vars: BTreeMap::from([(
                "PYSPARK_PYTHON".to_string(),
                "/databricks/python3/bin/python3".to_string(),
            )]),
        }
    }
}

/// Settings for the DatabricksJob controller
#[derive(Clone, Debug, PartialEq)]
pub struct JobControllerConfig {
    /// How often a submitted run is polled
    pub refresh_interval: Duration,
    /// Wait between cancelling a run and deleting it
    pub cancel_grace_period: Duration,
    /// Requeue delay after an optimistic-write conflict
    pub conflict_requeue: Duration,
    /// First error backoff delay, doubled per consecutive failure
    pub backoff_base: Duration,
    /// Upper bound on the error backoff delay
    pub backoff_max: Duration,
    /// Principal granted MANAGE on newly created secret scopes
    pub secret_scope_principal: String,
    /// Cluster template for new clusters
    pub cluster_defaults: ClusterDefaults,
}

impl Default for JobControllerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            cancel_grace_period: Duration::from_secs(10),
            conflict_requeue: Duration::from_secs(1),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            secret_scope_principal: "users".to_string(),
            cluster_defaults: ClusterDefaults::default(),
        }
    }
}

impl JobControllerConfig {
    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.refresh_interval.is_zero() {
            return Err(config_error("refresh interval must be greater than zero"));
        }
        if self.backoff_base.is_zero() || self.backoff_base > self.backoff_max {
            return Err(config_error(
                "backoff base must be non-zero and not exceed the backoff maximum",
            ));
        }
        if self.secret_scope_principal.trim().is_empty() {
            return Err(config_error("secret scope principal must not be empty"));
        }
        let defaults = &self.cluster_defaults;
        if defaults.spark_version.is_empty() || defaults.node_type_id.is_empty() {
            return Err(config_error(
                "default spark version and node type must not be empty",
            ));
        }
        if defaults.num_workers < 0 {
            return Err(config_error("default worker count must not be negative"));
        }
        Ok(())
    }

    /// Backoff delay after `failures` consecutive failed reconciles (1-based)
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.backoff_max)
    }
}

fn config_error(message: &str) -> Error {
    Error::internal_with_context("config", message)
}
