//! Kubernetes Events for DatabricksJob resources
//!
//! Controllers describe what happened as a [`JobEvent`] and hand it to an
//! [`EventPublisher`]; the events show up under `kubectl describe djob <name>`.
//! Publishing never fails from the caller's point of view: a rejected event
//! is logged and dropped so reconciliation carries on.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// One event about a job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobEvent {
    /// True for Warning events, false for Normal ones
    pub warning: bool,
    /// Machine-readable reason, one of [`reasons`]
    pub reason: &'static str,
    /// Protocol step, one of [`actions`]
    pub action: &'static str,
    /// Human-readable message
    pub note: String,
}

impl JobEvent {
    /// A Normal event
    pub fn normal(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: false,
            reason,
            action,
            note: note.into(),
        }
    }

    /// A Warning event
    pub fn warning(reason: &'static str, action: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: true,
            ..Self::normal(reason, action, note)
        }
    }

    fn into_event(self) -> Event {
        Event {
            type_: if self.warning {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: self.reason.to_string(),
            note: Some(self.note),
            action: self.action.to_string(),
            secondary: None,
        }
    }
}

/// Sink for [`JobEvent`]s
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Attach `event` to the object behind `resource_ref`
    async fn publish(&self, resource_ref: &ObjectReference, event: JobEvent);
}

/// Publisher backed by the kube [`Recorder`]
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Events are reported under `controller_name` as the reporting component
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, resource_ref: &ObjectReference, event: JobEvent) {
        let (reason, action) = (event.reason, event.action);
        if let Err(e) = self
            .recorder
            .publish(&event.into_event(), resource_ref)
            .await
        {
            warn!(reason, action, error = %e, "dropping Kubernetes event");
        }
    }
}

/// Publisher that discards everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _resource_ref: &ObjectReference, _event: JobEvent) {}
}

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// Deletion guard added to a new job
    pub const FINALIZER_ADDED: &str = "FinalizerAdded";
    /// Deletion guard removed after cleanup
    pub const FINALIZER_REMOVED: &str = "FinalizerRemoved";
    /// Secret scope populated from Kubernetes secrets
    pub const SECRETS_SYNCED: &str = "SecretsSynced";
    /// Run accepted by the platform
    pub const RUN_SUBMITTED: &str = "RunSubmitted";
    /// Recurring job registered with its schedule
    pub const JOB_CREATED: &str = "JobCreated";
    /// Submission attempt failed
    pub const SUBMISSION_FAILED: &str = "SubmissionFailed";
    /// Remote run changed state
    pub const RUN_STATE_CHANGED: &str = "RunStateChanged";
    /// Remote run or job no longer exists on the platform
    pub const RUN_LOST: &str = "RunLost";
    /// Status refresh failed
    pub const REFRESH_FAILED: &str = "RefreshFailed";
    /// Remote run cancelled and deleted
    pub const RUN_DELETED: &str = "RunDeleted";
    /// Recurring job's runs cancelled and the job deleted
    pub const JOB_DELETED: &str = "JobDeleted";
    /// Deletion protocol failed
    pub const DELETION_FAILED: &str = "DeletionFailed";
}

/// Event actions, shown in the ACTION column of `kubectl get events`
pub mod actions {
    /// Guarding a new job
    pub const RECONCILE: &str = "Reconcile";
    /// Submitting a run or registering a recurring job
    pub const SUBMIT: &str = "Submit";
    /// Polling run state
    pub const REFRESH: &str = "Refresh";
    /// Tearing down the remote run or job
    pub const DELETE: &str = "Delete";
}
