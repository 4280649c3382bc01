//! Job controller error types

use dbx_common::kube_utils::is_conflict;
use dbx_platform::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("kubernetes error: {0}")]
    Kube(kube::Error),

    /// The resource changed between read and write; re-fetch and start over
    #[error("write conflict, resource changed since it was read: {0}")]
    Conflict(kube::Error),

    #[error("databricks error: {0}")]
    Platform(#[from] PlatformError),

    #[error("{0}")]
    Common(#[from] dbx_common::Error),

    #[error("missing namespace on DatabricksJob")]
    MissingNamespace,

    #[error("no cluster named '{0}' in the workspace")]
    ClusterNotFound(String),

    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("secret {secret} has no key '{key}'")]
    SecretKeyMissing { secret: String, key: String },

    #[error("malformed platform response: {0}")]
    MalformedResponse(String),
}

impl From<kube::Error> for JobError {
    fn from(e: kube::Error) -> Self {
        if is_conflict(&e) {
            JobError::Conflict(e)
        } else {
            JobError::Kube(e)
        }
    }
}

impl JobError {
    /// True for an optimistic-write rejection
    pub fn is_conflict(&self) -> bool {
        matches!(self, JobError::Conflict(_))
    }

    /// Whether the same reconcile can succeed later without a spec change
    ///
    /// Missing clusters, Secrets and keys count as retryable: they may be
    /// created after the job.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Platform(e) => e.is_retryable(),
            JobError::Common(dbx_common::Error::Validation { .. })
            | JobError::MissingNamespace
            | JobError::MalformedResponse(_) => false,
            _ => true,
        }
    }
}
