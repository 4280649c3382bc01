//! Reads and optimistic writes against the Kubernetes API
//!
//! Every write is a merge patch guarded by the `resourceVersion` of the object
//! the caller read, so a concurrent change surfaces as [`JobError::Conflict`]
//! instead of being overwritten. Status patches are computed against the
//! status the caller read, so cleared fields are removed rather than merged.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use dbx_common::crd::{DatabricksJob, DatabricksJobStatus};
use dbx_common::kube_utils::{
    finalizer_patch, finalizers_with, finalizers_without, has_finalizer, is_not_found,
    status_patch,
};

use crate::error::JobError;

/// Field manager recorded on writes made by this controller
pub const FIELD_MANAGER: &str = "databricks-job-controller";

/// Kubernetes operations used by the job controller
///
/// Allows mocking the API server in tests while using the real client in
/// production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch the current version of a job, `None` if it no longer exists
    async fn get_job(&self, namespace: &str, name: &str)
        -> Result<Option<DatabricksJob>, JobError>;

    /// Add a finalizer; a no-op if the job already carries it
    async fn add_finalizer(&self, job: &DatabricksJob, finalizer: &str) -> Result<(), JobError>;

    /// Remove a finalizer; a job that is already gone counts as success
    async fn remove_finalizer(&self, job: &DatabricksJob, finalizer: &str)
        -> Result<(), JobError>;

    /// Replace the status subresource
    async fn patch_status(
        &self,
        job: &DatabricksJob,
        status: &DatabricksJobStatus,
    ) -> Result<(), JobError>;

    /// Fetch a Secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, JobError>;
}

/// [`JobStore`] backed by a kube [`Client`]
pub struct KubeJobStore {
    client: Client,
}

impl KubeJobStore {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn jobs(&self, job: &DatabricksJob) -> Result<Api<DatabricksJob>, JobError> {
        let namespace = job.namespace().ok_or(JobError::MissingNamespace)?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

/// Merge patch taking the stored status of `job` to `status`
fn status_body(job: &DatabricksJob, status: &DatabricksJobStatus) -> Result<Value, JobError> {
    Ok(status_patch(job, job.status.as_ref(), status)?)
}

#[async_trait]
impl JobStore for KubeJobStore {
    async fn get_job(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DatabricksJob>, JobError> {
        let api: Api<DatabricksJob> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn add_finalizer(&self, job: &DatabricksJob, finalizer: &str) -> Result<(), JobError> {
        let Some(finalizers) = finalizers_with(job, finalizer) else {
            return Ok(());
        };
        let patch = finalizer_patch(job, &finalizers);
        self.jobs(job)?
            .patch(
                &job.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        debug!(job = %job.name_any(), finalizer, "added finalizer");
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        job: &DatabricksJob,
        finalizer: &str,
    ) -> Result<(), JobError> {
        if !has_finalizer(job, finalizer) {
            return Ok(());
        }
        let patch = finalizer_patch(job, &finalizers_without(job, finalizer));
        match self
            .jobs(job)?
            .patch(
                &job.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
        {
            Ok(_) => {
                debug!(job = %job.name_any(), finalizer, "removed finalizer");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(
        &self,
        job: &DatabricksJob,
        status: &DatabricksJobStatus,
    ) -> Result<(), JobError> {
        let patch = status_body(job, status)?;
        self.jobs(job)?
            .patch_status(
                &job.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, JobError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_job, with_status};
    use dbx_common::crd::{RunLifeCycleState, RunState};
    use serde_json::Map;

    /// Apply `patch` to `target` the way the API server applies a merge patch
    fn apply_merge_patch(target: &mut Value, patch: &Value) {
        let Value::Object(fields) = patch else {
            *target = patch.clone();
            return;
        };
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        if let Value::Object(existing) = target {
            for (key, value) in fields {
                if value.is_null() {
                    existing.remove(key);
                } else {
                    apply_merge_patch(existing.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
    }

    /// Write `status` over the stored job and read the result back
    fn write_status(stored: &DatabricksJob, status: &DatabricksJobStatus) -> DatabricksJob {
        let body = status_body(stored, status).unwrap();
        let mut object = serde_json::to_value(stored).unwrap();
        apply_merge_patch(&mut object["status"], &body["status"]);
        serde_json::from_value(object).unwrap()
    }

    fn state(life: RunLifeCycleState, message: Option<&str>) -> RunState {
        RunState {
            life_cycle_state: life,
            result_state: None,
            state_message: message.map(str::to_string),
        }
    }

    #[test]
    fn cleared_state_message_does_not_survive_the_write() {
        let mut status = DatabricksJobStatus::submitted(42, None, "t0");
        status.record(
            state(RunLifeCycleState::Pending, Some("Waiting for cluster")),
            "t1",
        );
        let mut stored = with_status(sample_job("etl-1"), status);

        let running = state(RunLifeCycleState::Running, None);
        let mut writes = 0;
        for round in 0..3 {
            let current = stored.status.clone().unwrap_or_default();
            let now = format!("t{}", round + 2);
            if let Some(next) = current.observe(42, running.clone(), None, &now) {
                stored = write_status(&stored, &next);
                writes += 1;
            }
        }

        let status = stored.status.unwrap();
        assert_eq!(writes, 1);
        assert_eq!(status.state, Some(running));
        assert_eq!(status.history.len(), 3);
    }

    #[test]
    fn unchanged_fields_are_kept() {
        let scope = Some("data_etl-1_scope".to_string());
        let status = DatabricksJobStatus::submitted(42, scope, "t0");
        let stored = with_status(sample_job("etl-1"), status.clone());

        let running = state(RunLifeCycleState::Running, None);
        let next = status
            .observe(42, running, Some("https://x/run/42".into()), "t1")
            .unwrap();
        let written = write_status(&stored, &next).status.unwrap();

        assert_eq!(written, next);
        assert_eq!(written.secret_scope.as_deref(), Some("data_etl-1_scope"));
    }

    #[test]
    fn first_write_sends_the_full_status() {
        let job = sample_job("etl-1");
        let status = DatabricksJobStatus::submitted(42, None, "t0");

        let body = status_body(&job, &status).unwrap();
        assert_eq!(body["metadata"]["resourceVersion"], "1");
        assert_eq!(body["status"], serde_json::to_value(&status).unwrap());
    }
}
