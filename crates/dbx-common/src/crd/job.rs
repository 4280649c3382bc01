//! DatabricksJob CRD types
//!
//! Defines `DatabricksJob`: a one-time run submitted to a Databricks
//! workspace, or a recurring job registered with a cron schedule. The spec is
//! authored by the owner and treated as immutable once submitted; the status
//! mirrors the state of the remote run (the latest run, for recurring jobs).

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::library::LibrarySpec;
use super::run_state::{RunState, RunStateTransition};
use crate::Error;

/// Number of state transitions kept in `status.history`
pub const MAX_STATUS_HISTORY: usize = 10;

// =============================================================================
// Cluster
// =============================================================================

/// Autoscaling bounds for a new cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoScaleSpec {
    /// Lower bound on workers
    pub min_workers: i32,
    /// Upper bound on workers
    pub max_workers: i32,
}

/// Cluster created for the run and torn down after it
///
/// Every field is optional; unset fields fall back to the operator's
/// configured cluster defaults.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewClusterSpec {
    /// Databricks runtime version, e.g. `13.3.x-scala2.12`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_version: Option<String>,

    /// Worker node type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type_id: Option<String>,

    /// Driver node type (worker node type when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_node_type_id: Option<String>,

    /// Fixed worker count; ignored when `autoscale` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<i32>,

    /// Autoscaling bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscale: Option<AutoScaleSpec>,

    /// Spark configuration, merged over the defaults
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_conf: BTreeMap<String, String>,

    /// Environment variables, merged over the defaults
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_env_vars: BTreeMap<String, String>,

    /// Tags applied to cluster resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_tags: BTreeMap<String, String>,
}

/// Resolved view of the cluster fields of a spec
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClusterRef<'a> {
    /// Run on an existing cluster by ID
    ExistingId(&'a str),
    /// Run on an existing cluster looked up by name
    ExistingName(&'a str),
    /// Create a cluster for the run, from defaults plus optional overrides
    New(Option<&'a NewClusterSpec>),
}

// =============================================================================
// Task
// =============================================================================

/// Notebook task
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookTaskSpec {
    /// Absolute workspace path of the notebook
    pub notebook_path: String,
    /// Widget values passed to the notebook
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub base_parameters: BTreeMap<String, String>,
}

/// JAR task
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SparkJarTaskSpec {
    /// Fully-qualified class containing `main`
    pub main_class_name: String,
    /// Arguments passed to `main`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Python file task
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SparkPythonTaskSpec {
    /// URI of the Python file
    pub python_file: String,
    /// Command-line arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// spark-submit task
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SparkSubmitTaskSpec {
    /// Arguments passed to spark-submit
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// The work executed by the run
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum TaskSpec {
    /// Run a notebook
    Notebook(NotebookTaskSpec),
    /// Run a JAR main class
    SparkJar(SparkJarTaskSpec),
    /// Run a Python file
    SparkPython(SparkPythonTaskSpec),
    /// Run spark-submit
    SparkSubmit(SparkSubmitTaskSpec),
}

impl std::fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notebook(_) => write!(f, "notebook"),
            Self::SparkJar(_) => write!(f, "sparkJar"),
            Self::SparkPython(_) => write!(f, "sparkPython"),
            Self::SparkSubmit(_) => write!(f, "sparkSubmit"),
        }
    }
}

// =============================================================================
// Schedule
// =============================================================================

/// Whether a schedule fires
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseStatus {
    /// Runs are started on schedule
    #[default]
    Unpaused,
    /// The job is kept but no runs are started
    Paused,
}

/// Cron trigger of a recurring job
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronScheduleSpec {
    /// Quartz cron expression, e.g. `0 15 2 * * ?`
    pub quartz_cron_expression: String,
    /// Java timezone ID the expression is evaluated in, e.g. `UTC`
    pub timezone_id: String,
    /// Unpaused when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_status: Option<PauseStatus>,
}

/// Upper bound the platform enforces on `maxConcurrentRuns`
pub const MAX_CONCURRENT_RUNS_LIMIT: i32 = 1000;

// =============================================================================
// Secrets & notifications
// =============================================================================

/// Copy keys of a Kubernetes Secret into the run's secret scope
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretMapping {
    /// Name of the Secret in the job's namespace
    pub secret_name: String,
    /// Keys to copy
    #[serde(default)]
    pub mapping: Vec<SecretKeyMapping>,
}

/// One key copied from a Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyMapping {
    /// Key in the Secret's data
    pub secret_key: String,
    /// Key written to the scope
    pub output_key: String,
}

/// Addresses notified about run life cycle events
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailNotificationsSpec {
    /// Notified when the run starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_start: Vec<String>,
    /// Notified when the run succeeds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<String>,
    /// Notified when the run fails
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,
}

// =============================================================================
// CRD
// =============================================================================

/// Databricks run, or recurring job, managed from Kubernetes
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "databricks.microsoft.com",
    version = "v1alpha1",
    kind = "DatabricksJob",
    plural = "databricksjobs",
    shortname = "djob",
    namespaced,
    status = "DatabricksJobStatus",
    printcolumn = r#"{"name":"JobId","type":"integer","jsonPath":".status.jobId","priority":1}"#,
    printcolumn = r#"{"name":"RunId","type":"integer","jsonPath":".status.runId"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state.lifeCycleState"}"#,
    printcolumn = r#"{"name":"Result","type":"string","jsonPath":".status.state.resultState"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabricksJobSpec {
    /// Run name shown in the workspace (resource name when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,

    /// ID of an existing cluster to run on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_cluster_id: Option<String>,

    /// Name of an existing cluster to run on, resolved at submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_cluster_name: Option<String>,

    /// Cluster to create for the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_cluster: Option<NewClusterSpec>,

    /// Work to execute
    pub task: TaskSpec,

    /// Libraries installed before the task starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<LibrarySpec>,

    /// Secrets copied into the run's secret scope
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretMapping>,

    /// Run timeout; 0 or unset means no timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,

    /// Retries after a failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,

    /// Minimum delay between the start of a failed attempt and the retry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_retry_interval_millis: Option<i32>,

    /// Retry when an attempt times out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on_timeout: Option<bool>,

    /// Email notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notifications: Option<EmailNotificationsSpec>,

    /// Register a recurring job with this trigger instead of submitting a
    /// one-time run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<CronScheduleSpec>,

    /// Concurrent runs allowed for a recurring job (platform default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_runs: Option<i32>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl DatabricksJobSpec {
    /// Which cluster the run targets
    pub fn cluster_ref(&self) -> ClusterRef<'_> {
        if let Some(id) = non_empty(&self.existing_cluster_id) {
            ClusterRef::ExistingId(id)
        } else if let Some(name) = non_empty(&self.existing_cluster_name) {
            ClusterRef::ExistingName(name)
        } else {
            ClusterRef::New(self.new_cluster.as_ref())
        }
    }

    /// True when the spec registers a recurring job
    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_some()
    }

    /// Validate the spec before anything is sent to the platform
    pub fn validate(&self, job: &str) -> Result<(), Error> {
        let cluster_refs = [
            non_empty(&self.existing_cluster_id).is_some(),
            non_empty(&self.existing_cluster_name).is_some(),
            self.new_cluster.is_some(),
        ];
        if cluster_refs.iter().filter(|set| **set).count() > 1 {
            return Err(Error::validation_for_field(
                job,
                "spec",
                "at most one of existingClusterId, existingClusterName and newCluster may be set",
            ));
        }

        if let Some(cluster) = &self.new_cluster {
            if cluster.num_workers.is_some_and(|n| n < 0) {
                return Err(Error::validation_for_field(
                    job,
                    "spec.newCluster.numWorkers",
                    "must not be negative",
                ));
            }
            if let Some(auto) = &cluster.autoscale {
                if auto.min_workers < 0 || auto.max_workers < auto.min_workers {
                    return Err(Error::validation_for_field(
                        job,
                        "spec.newCluster.autoscale",
                        "requires 0 <= minWorkers <= maxWorkers",
                    ));
                }
            }
        }

        let (field, value) = match &self.task {
            TaskSpec::Notebook(t) => ("spec.task.notebook.notebookPath", Some(&t.notebook_path)),
            TaskSpec::SparkJar(t) => ("spec.task.sparkJar.mainClassName", Some(&t.main_class_name)),
            TaskSpec::SparkPython(t) => ("spec.task.sparkPython.pythonFile", Some(&t.python_file)),
            TaskSpec::SparkSubmit(_) => ("", None),
        };
        if value.is_some_and(|v| v.is_empty()) {
            return Err(Error::validation_for_field(job, field, "must not be empty"));
        }

        for (i, lib) in self.libraries.iter().enumerate() {
            if lib.artifact().is_empty() {
                return Err(Error::validation_for_field(
                    job,
                    format!("spec.libraries[{i}].{}", lib.required_field()),
                    format!("must not be empty for a {} library", lib.kind),
                ));
            }
        }

        for (i, secret) in self.secrets.iter().enumerate() {
            if secret.secret_name.is_empty() {
                return Err(Error::validation_for_field(
                    job,
                    format!("spec.secrets[{i}].secretName"),
                    "must not be empty",
                ));
            }
            for (j, key) in secret.mapping.iter().enumerate() {
                if key.secret_key.is_empty() || key.output_key.is_empty() {
                    return Err(Error::validation_for_field(
                        job,
                        format!("spec.secrets[{i}].mapping[{j}]"),
                        "secretKey and outputKey must not be empty",
                    ));
                }
            }
        }

        let counters = [
            ("spec.timeoutSeconds", self.timeout_seconds),
            ("spec.maxRetries", self.max_retries),
            ("spec.minRetryIntervalMillis", self.min_retry_interval_millis),
        ];
        for (field, value) in counters {
            if value.is_some_and(|v| v < 0) {
                return Err(Error::validation_for_field(job, field, "must not be negative"));
            }
        }

        if let Some(schedule) = &self.schedule {
            if schedule.quartz_cron_expression.trim().is_empty() {
                return Err(Error::validation_for_field(
                    job,
                    "spec.schedule.quartzCronExpression",
                    "must not be empty",
                ));
            }
            if schedule.timezone_id.trim().is_empty() {
                return Err(Error::validation_for_field(
                    job,
                    "spec.schedule.timezoneId",
                    "must not be empty",
                ));
            }
        }

        if let Some(runs) = self.max_concurrent_runs {
            if self.schedule.is_none() {
                return Err(Error::validation_for_field(
                    job,
                    "spec.maxConcurrentRuns",
                    "only applies to jobs with a schedule",
                ));
            }
            if !(1..=MAX_CONCURRENT_RUNS_LIMIT).contains(&runs) {
                return Err(Error::validation_for_field(
                    job,
                    "spec.maxConcurrentRuns",
                    format!("must be between 1 and {MAX_CONCURRENT_RUNS_LIMIT}"),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status of a DatabricksJob
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabricksJobStatus {
    /// Recurring job ID; absent or 0 unless the spec has a schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,

    /// Platform run ID; absent or 0 until submitted. For a recurring job,
    /// the latest run seen

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,

    /// Last observed run state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,

    /// Link to the run in the workspace UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_page_url: Option<String>,

    /// Secret scope populated for this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_scope: Option<String>,

    /// When the run was submitted (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,

    /// When the stored state was last written (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<String>,

    /// Most recent state transitions, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<RunStateTransition>,
}

impl DatabricksJobStatus {
    /// Status recorded right after a successful submission
    pub fn submitted(run_id: i64, secret_scope: Option<String>, now: &str) -> Self {
        let mut status = Self {
            run_id: Some(run_id),
            secret_scope,
            submitted_at: Some(now.to_string()),
            ..Default::default()
        };
        status.record(RunState::default(), now);
        status
    }

    /// Status recorded right after a recurring job was registered; no run
    /// exists until the schedule first fires
    pub fn scheduled(job_id: i64, secret_scope: Option<String>, now: &str) -> Self {
        Self {
            job_id: Some(job_id),
            secret_scope,
            submitted_at: Some(now.to_string()),
            ..Default::default()
        }
    }

    /// Store `state` as the current one and append it to the bounded history
    pub fn record(&mut self, state: RunState, now: &str) {
        self.history.push(RunStateTransition {
            life_cycle_state: state.life_cycle_state,
            result_state: state.result_state,
            observed_at: now.to_string(),
        });
        if self.history.len() > MAX_STATUS_HISTORY {
            let excess = self.history.len() - MAX_STATUS_HISTORY;
            self.history.drain(..excess);
        }
        self.state = Some(state);
        self.last_refreshed = Some(now.to_string());
    }

    /// Status after observing run `run_id` in `state`, or `None` when both
    /// match the stored ones
    pub fn observe(
        &self,
        run_id: i64,
        state: RunState,
        run_page_url: Option<String>,
        now: &str,
    ) -> Option<Self> {
        if self.run_id == Some(run_id) && self.state.as_ref() == Some(&state) {
            return None;
        }
        let mut next = self.clone();
        next.run_id = Some(run_id);
        next.record(state, now);
        if run_page_url.is_some() {
            next.run_page_url = run_page_url;
        }
        Some(next)
    }
}

impl DatabricksJob {
    /// Registered recurring job ID, treating 0 as "not registered"
    pub fn job_id(&self) -> Option<i64> {
        self.status
            .as_ref()
            .and_then(|s| s.job_id)
            .filter(|id| *id != 0)
    }

    /// Submitted run ID, treating 0 as "not submitted"
    pub fn run_id(&self) -> Option<i64> {
        self.status
            .as_ref()
            .and_then(|s| s.run_id)
            .filter(|id| *id != 0)
    }

    /// Run name sent to the platform
    pub fn run_name(&self) -> String {
        match non_empty(&self.spec.run_name) {
            Some(name) => name.to_string(),
            None => self.name_any(),
        }
    }

    /// True once a refresh found the run (or recurring job) missing on the platform
    pub fn is_run_lost(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.state.as_ref())
            .is_some_and(RunState::is_lost)
    }
}

// =============================================================================
// Tests
// =============================================================================
