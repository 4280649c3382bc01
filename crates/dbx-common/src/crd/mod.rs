//! Custom Resource Definitions for the Databricks operator

mod job;
mod library;
mod run_state;

pub use job::{
    AutoScaleSpec, ClusterRef, CronScheduleSpec, DatabricksJob, DatabricksJobSpec,
    DatabricksJobStatus, EmailNotificationsSpec, NewClusterSpec, NotebookTaskSpec, PauseStatus,
    SecretKeyMapping, SecretMapping, SparkJarTaskSpec, SparkPythonTaskSpec, SparkSubmitTaskSpec,
    TaskSpec, MAX_CONCURRENT_RUNS_LIMIT, MAX_STATUS_HISTORY,
};
pub use library::{LibraryKind, LibrarySpec};
pub use run_state::{RunLifeCycleState, RunResultState, RunState, RunStateTransition};
