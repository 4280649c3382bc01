//! Wire types for the Jobs, Runs, Secrets and Clusters REST APIs
//!
//! Field names follow the platform's snake_case JSON. Maps are `BTreeMap` so
//! serializing the same payload twice yields identical bytes.

use std::collections::BTreeMap;

use base64::Engine;
use dbx_common::crd::{PauseStatus, RunLifeCycleState, RunResultState, RunState};
use serde::{Deserialize, Serialize};

// =============================================================================
// Runs
// =============================================================================

/// Body of `POST /api/2.1/jobs/runs/submit`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmitRun {
    /// Display name of the run
    pub run_name: String,
    /// Run-level timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    /// Token making repeated submissions return the original run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_token: Option<String>,
    /// Run-level notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notifications: Option<EmailNotifications>,
    /// Tasks; this operator always submits exactly one
    pub tasks: Vec<SubmitTask>,
}

/// One task of a submitted run
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SubmitTask {
    /// Task key, unique within the run
    pub task_key: String,
    /// Existing cluster to run on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_cluster_id: Option<String>,
    /// Cluster created for the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_cluster: Option<NewCluster>,
    /// Notebook task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_task: Option<NotebookTask>,
    /// JAR task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_jar_task: Option<SparkJarTask>,
    /// Python file task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_python_task: Option<SparkPythonTask>,
    /// spark-submit task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_submit_task: Option<SparkSubmitTask>,
    /// Libraries installed before the task runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<Library>,
    /// Task timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    /// Retries after failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,
    /// Minimum delay between retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_retry_interval_millis: Option<i32>,
    /// Retry on timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_on_timeout: Option<bool>,
}

/// Cluster specification for a run
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NewCluster {
    /// Runtime version
    pub spark_version: String,
    /// Worker node type
    pub node_type_id: String,
    /// Driver node type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_node_type_id: Option<String>,
    /// Fixed worker count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<i32>,
    /// Autoscaling bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscale: Option<AutoScale>,
    /// Spark configuration
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_conf: BTreeMap<String, String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_env_vars: BTreeMap<String, String>,
    /// Resource tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_tags: BTreeMap<String, String>,
}

/// Autoscaling bounds
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AutoScale {
    /// Lower bound
    pub min_workers: i32,
    /// Upper bound
    pub max_workers: i32,
}

/// Notebook task
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NotebookTask {
    /// Workspace path
    pub notebook_path: String,
    /// Widget values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub base_parameters: BTreeMap<String, String>,
}

/// JAR task
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SparkJarTask {
    /// Main class
    pub main_class_name: String,
    /// Arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Python file task
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SparkPythonTask {
    /// File URI
    pub python_file: String,
    /// Arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// spark-submit task
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SparkSubmitTask {
    /// Arguments
    #[serde(default)]
    pub parameters: Vec<String>,
}

/// Library entry; exactly one field is set
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Library {
    /// Jar URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jar: Option<String>,
    /// Egg URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egg: Option<String>,
    /// Wheel URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whl: Option<String>,
    /// PyPI package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi: Option<PythonPyPiLibrary>,
    /// Maven artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maven: Option<MavenLibrary>,
    /// CRAN package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cran: Option<RCranLibrary>,
}

/// PyPI package reference
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PythonPyPiLibrary {
    /// Requirement string
    pub package: String,
    /// Index URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Maven artifact reference
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MavenLibrary {
    /// Coordinates
    pub coordinates: String,
    /// Repository URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Excluded dependencies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
}

/// CRAN package reference
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RCranLibrary {
    /// Package name
    pub package: String,
    /// Mirror URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

/// Notification recipients
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmailNotifications {
    /// On start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_start: Vec<String>,
    /// On success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<String>,
    /// On failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRunResponse {
    #[serde(default)]
    pub run_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunIdRequest {
    pub run_id: i64,
}

/// Response of `GET /api/2.1/jobs/runs/get`, and one entry of `runs/list`
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RunInfo {
    /// Run ID
    pub run_id: i64,
    /// Current run state
    #[serde(default)]
    pub state: RunStateInfo,
    /// Link to the run in the workspace UI
    #[serde(default)]
    pub run_page_url: Option<String>,
}

/// Run state as returned by the platform
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RunStateInfo {
    /// Life cycle state
    #[serde(default)]
    pub life_cycle_state: RunLifeCycleState,
    /// Result, once finished
    #[serde(default)]
    pub result_state: Option<RunResultState>,
    /// Platform message
    #[serde(default)]
    pub state_message: Option<String>,
}

impl From<RunStateInfo> for RunState {
    fn from(info: RunStateInfo) -> Self {
        RunState {
            life_cycle_state: info.life_cycle_state,
            result_state: info.result_state,
            state_message: info.state_message.filter(|m| !m.is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunList {
    #[serde(default)]
    pub runs: Vec<RunInfo>,
}

// =============================================================================
// Jobs
// =============================================================================

/// Tag carrying the UID of the resource that registered a recurring job
pub const OWNER_UID_TAG: &str = "k8s-owner-uid";

/// Body of `POST /api/2.1/jobs/create`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateJob {
    /// Job name
    pub name: String,
    /// Per-run timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,
    /// Run-level notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notifications: Option<EmailNotifications>,
    /// Cron trigger
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<CronSchedule>,
    /// Concurrent runs allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_runs: Option<i32>,
    /// Job tags; always carries [`OWNER_UID_TAG`] when the owner has a UID
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Tasks; this operator always registers exactly one
    pub tasks: Vec<SubmitTask>,
}

/// Cron trigger of a job
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CronSchedule {
    /// Quartz cron expression
    pub quartz_cron_expression: String,
    /// Java timezone ID
    pub timezone_id: String,
    /// Paused or unpaused
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_status: Option<PauseStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateJobResponse {
    #[serde(default)]
    pub job_id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JobIdRequest {
    pub job_id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobList {
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobSummary {
    pub job_id: i64,
    #[serde(default)]
    pub settings: JobSummarySettings,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JobSummarySettings {
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl JobSummary {
    pub(crate) fn is_owned_by(&self, owner_uid: &str) -> bool {
        self.settings.tags.get(OWNER_UID_TAG).map(String::as_str) == Some(owner_uid)
    }
}

// =============================================================================
// Secrets
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CreateScopeRequest<'a> {
    pub scope: &'a str,
    pub initial_manage_principal: &'a str,
}

#[derive(Serialize)]
pub(crate) struct PutSecretRequest<'a> {
    pub scope: &'a str,
    pub key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_value: Option<String>,
}

/// Value written to a secret scope
#[derive(Clone, PartialEq)]
pub enum SecretValue {
    /// UTF-8 text, sent as `string_value`
    Text(String),
    /// Arbitrary bytes, sent base64-encoded as `bytes_value`
    Bytes(Vec<u8>),
}

impl SecretValue {
    /// Text when `raw` is valid UTF-8, bytes otherwise
    pub fn from_raw(raw: Vec<u8>) -> Self {
        match String::from_utf8(raw) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Bytes(e.into_bytes()),
        }
    }

    pub(crate) fn request<'a>(&'a self, scope: &'a str, key: &'a str) -> PutSecretRequest<'a> {
        let (string_value, bytes_value) = match self {
            Self::Text(text) => (Some(text.as_str()), None),
            Self::Bytes(bytes) => (
                None,
                Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            ),
        };
        PutSecretRequest {
            scope,
            key,
            string_value,
            bytes_value,
        }
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(_) => f.write_str("SecretValue::Text(<redacted>)"),
            Self::Bytes(b) => write!(f, "SecretValue::Bytes(<{} bytes>)", b.len()),
        }
    }
}

// =============================================================================
// Clusters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ClusterList {
    #[serde(default)]
    pub clusters: Vec<ClusterInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterInfo {
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: String,
}
