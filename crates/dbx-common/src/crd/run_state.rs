//! Remote run state as reported by the platform and mirrored into status

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Life cycle of a platform run
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunLifeCycleState {
    /// Waiting for a concurrency slot
    Queued,
    /// Cluster is being acquired
    #[default]
    Pending,
    /// Task is executing
    Running,
    /// Task finished, cluster is being cleaned up
    Terminating,
    /// Run finished; see the result state
    Terminated,
    /// Run was skipped by the platform
    Skipped,
    /// Platform failure unrelated to the task
    InternalError,
    /// Blocked on an upstream dependency
    Blocked,
    /// Waiting before the next retry attempt
    WaitingForRetry,
    /// The platform no longer knows the run (deleted out-of-band)
    Lost,
    /// A state this operator does not recognize
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for RunLifeCycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Skipped => "SKIPPED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Blocked => "BLOCKED",
            Self::WaitingForRetry => "WAITING_FOR_RETRY",
            Self::Lost => "LOST",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Outcome of a finished run
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunResultState {
    /// Completed successfully
    Success,
    /// Completed with an error
    Failed,
    /// Stopped after reaching the timeout
    Timedout,
    /// Cancelled on request
    Canceled,
    /// Skipped because too many runs were active
    MaximumConcurrentRunsReached,
    /// Completed, but some tasks failed
    SuccessWithFailures,
    /// A result this operator does not recognize
    #[serde(other)]
    Unknown,
}

/// Observed state of a platform run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Where the run is in its life cycle
    #[serde(default)]
    pub life_cycle_state: RunLifeCycleState,

    /// Outcome, present once the run has finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_state: Option<RunResultState>,

    /// Free-form message from the platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_message: Option<String>,
}

impl RunState {
    /// State recorded when the platform reports the run as missing
    pub fn lost(message: impl Into<String>) -> Self {
        Self {
            life_cycle_state: RunLifeCycleState::Lost,
            result_state: None,
            state_message: Some(message.into()),
        }
    }

    /// True when the stored state marks the run as gone from the platform
    pub fn is_lost(&self) -> bool {
        self.life_cycle_state == RunLifeCycleState::Lost
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.result_state {
            Some(result) => write!(f, "{}/{:?}", self.life_cycle_state, result),
            None => write!(f, "{}", self.life_cycle_state),
        }
    }
}

/// One entry of the bounded status history
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunStateTransition {
    /// Life cycle state entered
    pub life_cycle_state: RunLifeCycleState,

    /// Result, if the run had finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_state: Option<RunResultState>,

    /// RFC 3339 time the operator observed the transition
    pub observed_at: String,
}
