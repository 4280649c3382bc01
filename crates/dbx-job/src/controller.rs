//! DatabricksJob controller implementation
//!
//! The state of a job is derived on every reconcile, never stored:
//!
//! | finalizer | deletionTimestamp | jobId / runId | state         | action                     |
//! |-----------|-------------------|---------------|---------------|----------------------------|
//! | yes       | set               | any           | `Terminating` | cancel + delete run or job |
//! | no        | set               | any           | `Terminated`  | nothing                    |
//! | no        | unset             | any           | `Pending`     | add finalizer              |
//! | yes       | unset             | none / none   | `Guarded`     | submit run or register job |
//! | yes       | unset             | none / some   | `Submitted`   | refresh run state          |
//! | yes       | unset             | some / any    | `Scheduled`   | refresh latest run         |
//!
//! Jobs with a schedule are registered as recurring jobs; the rest are
//! submitted as one-time runs.
//!
//! Every transition either fully commits or returns an error without
//! persisting anything, so the work queue can simply run it again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use dbx_common::crd::{ClusterRef, DatabricksJob, DatabricksJobStatus, RunState};
use dbx_platform::models::RunInfo;
use dbx_common::events::{actions, reasons};
use dbx_common::kube_utils::{has_finalizer, is_being_deleted};
use dbx_common::{EventPublisher, JobEvent};
use dbx_platform::DatabricksApi;

use crate::config::JobControllerConfig;
use crate::error::JobError;
use crate::secrets::{resolve_secrets, scope_name, sync_secrets};
use crate::store::JobStore;
use crate::translator::{translate, translate_job, ResolvedCluster, SubmissionContext};

/// Finalizer guarding remote cleanup of a job's run
pub const JOB_FINALIZER: &str = "databricksjob.finalizers.databricks.microsoft.com";

// =============================================================================
// State
// =============================================================================

/// Where a job is in its life cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Not yet guarded by the finalizer
    Pending,
    /// Guarded, no run submitted yet
    Guarded,
    /// Run submitted with this ID
    Submitted(i64),
    /// Recurring job registered with this ID
    Scheduled(i64),
    /// Deletion requested, cleanup still pending
    Terminating,
    /// Deletion requested, cleanup done
    Terminated,
}

impl JobState {
    /// Derive the state of a job, deletion taking priority
    pub fn of(job: &DatabricksJob) -> Self {
        let guarded = has_finalizer(job, JOB_FINALIZER);
        match (is_being_deleted(job), guarded, job.job_id(), job.run_id()) {
            (true, true, ..) => Self::Terminating,
            (true, false, ..) => Self::Terminated,
            (false, false, ..) => Self::Pending,
            (false, true, Some(job_id), _) => Self::Scheduled(job_id),
            (false, true, None, Some(run_id)) => Self::Submitted(run_id),
            (false, true, None, None) => Self::Guarded,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Guarded => write!(f, "Guarded"),
            Self::Submitted(id) => write!(f, "Submitted({id})"),
            Self::Scheduled(id) => write!(f, "Scheduled({id})"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared context for the DatabricksJob controller
pub struct JobContext {
    /// Kubernetes reads and writes
    pub store: Arc<dyn JobStore>,
    /// Databricks workspace client
    pub platform: Arc<dyn DatabricksApi>,
    /// Event publisher for emitting Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Controller settings
    pub config: JobControllerConfig,
    /// Consecutive failures per `namespace/name`, for error backoff
    failures: DashMap<String, u32>,
}

impl JobContext {
    /// Create a new JobContext with the given dependencies
    pub fn new(
        store: Arc<dyn JobStore>,
        platform: Arc<dyn DatabricksApi>,
        events: Arc<dyn EventPublisher>,
        config: JobControllerConfig,
    ) -> Self {
        Self {
            store,
            platform,
            events,
            config,
            failures: DashMap::new(),
        }
    }

    /// Context with no-op events and a zero cancel grace period
    #[cfg(test)]
    pub fn for_testing(store: Arc<dyn JobStore>, platform: Arc<dyn DatabricksApi>) -> Self {
        Self::new(
            store,
            platform,
            Arc::new(dbx_common::NoopEventPublisher),
            JobControllerConfig {
                cancel_grace_period: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    async fn publish(&self, job: &DatabricksJob, event: JobEvent) {
        self.events.publish(&job.object_ref(&()), event).await;
    }
}

fn job_key(job: &DatabricksJob) -> String {
    format!("{}/{}", job.namespace().unwrap_or_default(), job.name_any())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

// =============================================================================
// Reconcile
// =============================================================================

/// Reconcile a DatabricksJob
///
/// Re-reads the job before acting so that decisions are made against the
/// latest resourceVersion; a job that no longer exists ends the reconcile.
#[instrument(skip(job, ctx), fields(job = %job.name_any()))]
pub async fn reconcile(job: Arc<DatabricksJob>, ctx: Arc<JobContext>) -> Result<Action, JobError> {
    let namespace = job.namespace().ok_or(JobError::MissingNamespace)?;
    let name = job.name_any();
    let key = job_key(&job);

    let Some(current) = ctx.store.get_job(&namespace, &name).await? else {
        debug!("job no longer exists");
        ctx.failures.remove(&key);
        return Ok(Action::await_change());
    };

    let state = JobState::of(&current);
    debug!(%state, "reconciling");

    let action = match state {
        JobState::Terminating => finalize(&current, &ctx).await?,
        JobState::Terminated => Action::await_change(),
        JobState::Pending => {
            ctx.store.add_finalizer(&current, JOB_FINALIZER).await?;
            ctx.publish(
                &current,
                JobEvent::normal(
                    reasons::FINALIZER_ADDED,
                    actions::RECONCILE,
                    format!("added finalizer {JOB_FINALIZER}"),
                ),
            )
            .await;
            Action::requeue(Duration::ZERO)
        }
        JobState::Guarded => submit(&current, &ctx).await?,
        JobState::Submitted(run_id) => refresh(&current, run_id, &ctx).await?,
        JobState::Scheduled(job_id) => refresh_job(&current, job_id, &ctx).await?,
    };

    ctx.failures.remove(&key);
    Ok(action)
}

/// Error policy for DatabricksJob reconciliation
///
/// Conflicts are retried almost immediately against a fresh read. Other
/// failures back off exponentially per job until the next success; failures
/// that only a spec change can fix wait the maximum delay straight away.
pub fn error_policy(job: Arc<DatabricksJob>, error: &JobError, ctx: Arc<JobContext>) -> Action {
    if error.is_conflict() {
        debug!(job = %job.name_any(), "write conflict, retrying with a fresh read");
        return Action::requeue(ctx.config.conflict_requeue);
    }

    let failures = {
        let mut count = ctx.failures.entry(job_key(&job)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    };
    let retryable = error.is_retryable();
    let delay = if retryable {
        ctx.config.backoff_delay(failures)
    } else {
        ctx.config.backoff_max
    };
    error!(
        error = %error,
        job = %job.name_any(),
        failures,
        retryable,
        retry_in = ?delay,
        "job reconciliation failed"
    );
    Action::requeue(delay)
}

// =============================================================================
// Submission
// =============================================================================

async fn submit(job: &DatabricksJob, ctx: &JobContext) -> Result<Action, JobError> {
    let status = match submit_run(job, ctx).await {
        Ok(status) => status,
        Err(e) => {
            ctx.publish(
                job,
                JobEvent::warning(reasons::SUBMISSION_FAILED, actions::SUBMIT, e.to_string()),
            )
            .await;
            return Err(e);
        }
    };

    ctx.store.patch_status(job, &status).await?;

    let event = match (status.job_id, job.spec.schedule.as_ref()) {
        (Some(job_id), Some(schedule)) => {
            info!(job_id, "registered recurring job");
            JobEvent::normal(
                reasons::JOB_CREATED,
                actions::SUBMIT,
                format!(
                    "registered job {job_id} on schedule '{}' ({})",
                    schedule.quartz_cron_expression, schedule.timezone_id
                ),
            )
        }
        _ => {
            let run_id = status.run_id.unwrap_or_default();
            info!(run_id, "submitted run");
            JobEvent::normal(
                reasons::RUN_SUBMITTED,
                actions::SUBMIT,
                format!("submitted run {run_id}"),
            )
        }
    };
    ctx.publish(job, event).await;
    Ok(Action::requeue(Duration::ZERO))
}

/// Resolve, translate and submit or register; returns the status to persist
async fn submit_run(job: &DatabricksJob, ctx: &JobContext) -> Result<DatabricksJobStatus, JobError> {
    let name = job.name_any();
    let namespace = job.namespace().ok_or(JobError::MissingNamespace)?;
    job.spec.validate(&name)?;

    let cluster = match job.spec.cluster_ref() {
        ClusterRef::ExistingId(id) => ResolvedCluster::Existing(id.to_string()),
        ClusterRef::ExistingName(cluster_name) => {
            let id = ctx
                .platform
                .find_cluster_id(cluster_name)
                .await?
                .ok_or_else(|| JobError::ClusterNotFound(cluster_name.to_string()))?;
            debug!(cluster = cluster_name, cluster_id = %id, "resolved cluster by name");
            ResolvedCluster::Existing(id)
        }
        ClusterRef::New(overrides) => ResolvedCluster::New(overrides),
    };

    let secret_scope = if job.spec.secrets.is_empty() {
        None
    } else {
        let scope = scope_name(&namespace, &name);
        let values = resolve_secrets(ctx.store.as_ref(), &namespace, &job.spec.secrets).await?;
        sync_secrets(
            ctx.platform.as_ref(),
            &scope,
            &ctx.config.secret_scope_principal,
            &values,
        )
        .await?;
        ctx.publish(
            job,
            JobEvent::normal(
                reasons::SECRETS_SYNCED,
                actions::SUBMIT,
                format!("wrote {} secrets to scope {scope}", values.len()),
            ),
        )
        .await;
        Some(scope)
    };

    let run_name = job.run_name();
    let uid = job.uid();
    let submission = SubmissionContext {
        run_name: &run_name,
        owner_uid: uid.as_deref(),
        defaults: &ctx.config.cluster_defaults,
    };

    if job.spec.is_scheduled() {
        let job_id = register_job(job, &cluster, submission, ctx).await?;
        return Ok(DatabricksJobStatus::scheduled(job_id, secret_scope, &now()));
    }

    let payload = translate(&job.spec, &cluster, submission);
    let run_id = ctx.platform.submit_run(&payload).await?;
    if run_id == 0 {
        return Err(JobError::MalformedResponse(
            "submit run returned run_id 0".to_string(),
        ));
    }

    Ok(DatabricksJobStatus::submitted(run_id, secret_scope, &now()))
}

/// Create the recurring job, or adopt the one an earlier attempt created
///
/// Jobs have no idempotency token; a job is adopted when it has the same name
/// and carries the owner UID tag.
async fn register_job(
    job: &DatabricksJob,
    cluster: &ResolvedCluster<'_>,
    submission: SubmissionContext<'_>,
    ctx: &JobContext,
) -> Result<i64, JobError> {
    if let Some(owner_uid) = submission.owner_uid {
        if let Some(job_id) = ctx
            .platform
            .find_job_id(submission.run_name, owner_uid)
            .await?
        {
            debug!(job_id, "recurring job already registered");
            return Ok(job_id);
        }
    }

    let payload = translate_job(&job.spec, cluster, submission);
    let job_id = ctx.platform.create_job(&payload).await?;
    if job_id == 0 {
        return Err(JobError::MalformedResponse(
            "create job returned job_id 0".to_string(),
        ));
    }
    Ok(job_id)
}

// =============================================================================
// Refresh
// =============================================================================

async fn refresh(job: &DatabricksJob, run_id: i64, ctx: &JobContext) -> Result<Action, JobError> {
    if job.is_run_lost() {
        debug!(run_id, "run is lost, not polling");
        return Ok(Action::await_change());
    }

    let current = job.status.clone().unwrap_or_default();
    let run = match ctx.platform.get_run(run_id).await {
        Ok(run) => run,
        Err(e) if e.is_not_found() => {
            return mark_lost(job, current, format!("run {run_id}"), ctx).await;
        }
        Err(e) => return Err(refresh_failed(job, e.into(), ctx).await),
    };

    record_run(job, &current, run_id, run, ctx).await?;
    Ok(Action::requeue(ctx.config.refresh_interval))
}

/// Mirror the latest run of a recurring job
async fn refresh_job(job: &DatabricksJob, job_id: i64, ctx: &JobContext) -> Result<Action, JobError> {
    if job.is_run_lost() {
        debug!(job_id, "job is lost, not polling");
        return Ok(Action::await_change());
    }

    let current = job.status.clone().unwrap_or_default();
    let run = match ctx.platform.latest_run(job_id).await {
        Ok(Some(run)) => run,
        Ok(None) => {
            debug!(job_id, "schedule has not fired yet");
            return Ok(Action::requeue(ctx.config.refresh_interval));
        }
        Err(e) if e.is_not_found() => {
            return mark_lost(job, current, format!("job {job_id}"), ctx).await;
        }
        Err(e) => return Err(refresh_failed(job, e.into(), ctx).await),
    };

    let run_id = run.run_id;
    record_run(job, &current, run_id, run, ctx).await?;
    Ok(Action::requeue(ctx.config.refresh_interval))
}

/// Persist `run` when it differs from the stored run and state
async fn record_run(
    job: &DatabricksJob,
    current: &DatabricksJobStatus,
    run_id: i64,
    run: RunInfo,
    ctx: &JobContext,
) -> Result<(), JobError> {
    let state = RunState::from(run.state);
    let Some(next) = current.observe(run_id, state.clone(), run.run_page_url, &now()) else {
        return Ok(());
    };

    ctx.store.patch_status(job, &next).await?;
    info!(run_id, state = %state, "run state changed");
    ctx.publish(
        job,
        JobEvent::normal(
            reasons::RUN_STATE_CHANGED,
            actions::REFRESH,
            format!("run {run_id} is {state}"),
        ),
    )
    .await;
    Ok(())
}

/// Record `target` as LOST once and stop polling
async fn mark_lost(
    job: &DatabricksJob,
    mut status: DatabricksJobStatus,
    target: String,
    ctx: &JobContext,
) -> Result<Action, JobError> {
    warn!(%target, "no longer exists on the platform");
    status.record(
        RunState::lost(format!("{target} not found on the platform")),
        &now(),
    );
    ctx.store.patch_status(job, &status).await?;
    ctx.publish(
        job,
        JobEvent::warning(
            reasons::RUN_LOST,
            actions::REFRESH,
            format!("{target} no longer exists on the platform; polling stopped"),
        ),
    )
    .await;
    Ok(Action::await_change())
}

async fn refresh_failed(job: &DatabricksJob, error: JobError, ctx: &JobContext) -> JobError {
    ctx.publish(
        job,
        JobEvent::warning(reasons::REFRESH_FAILED, actions::REFRESH, error.to_string()),
    )
    .await;
    error
}

// =============================================================================
// Deletion
// =============================================================================

async fn finalize(job: &DatabricksJob, ctx: &JobContext) -> Result<Action, JobError> {
    let teardown = match (job.job_id(), job.run_id()) {
        (Some(job_id), _) => Some((
            teardown_job(job_id, ctx).await,
            reasons::JOB_DELETED,
            format!("cancelled active runs and deleted job {job_id}"),
        )),
        (None, Some(run_id)) => Some((
            teardown_run(run_id, ctx).await,
            reasons::RUN_DELETED,
            format!("cancelled and deleted run {run_id}"),
        )),
        (None, None) => None,
    };

    if let Some((result, reason, note)) = teardown {
        if let Err(e) = result {
            ctx.publish(
                job,
                JobEvent::warning(reasons::DELETION_FAILED, actions::DELETE, e.to_string()),
            )
            .await;
            return Err(e);
        }
        ctx.publish(job, JobEvent::normal(reason, actions::DELETE, note))
            .await;
    }

    ctx.store.remove_finalizer(job, JOB_FINALIZER).await?;
    info!("removed finalizer, job can be deleted");
    ctx.publish(
        job,
        JobEvent::normal(
            reasons::FINALIZER_REMOVED,
            actions::DELETE,
            format!("removed finalizer {JOB_FINALIZER}"),
        ),
    )
    .await;
    Ok(Action::await_change())
}

/// Cancel, wait out the grace period, then delete; a missing run counts as done
async fn teardown_run(run_id: i64, ctx: &JobContext) -> Result<(), JobError> {
    match ctx.platform.cancel_run(run_id).await {
        Ok(()) => debug!(run_id, "cancelled run"),
        Err(e) if e.is_not_found() => debug!(run_id, "run already gone, nothing to cancel"),
        Err(e) => return Err(e.into()),
    }

    tokio::time::sleep(ctx.config.cancel_grace_period).await;

    match ctx.platform.delete_run(run_id).await {
        Ok(()) => debug!(run_id, "deleted run"),
        Err(e) if e.is_not_found() => debug!(run_id, "run already gone, nothing to delete"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Cancel every active run, wait out the grace period, then delete the job;
/// a missing job counts as done
async fn teardown_job(job_id: i64, ctx: &JobContext) -> Result<(), JobError> {
    match ctx.platform.cancel_all_runs(job_id).await {
        Ok(()) => debug!(job_id, "cancelled active runs"),
        Err(e) if e.is_not_found() => debug!(job_id, "job already gone, nothing to cancel"),
        Err(e) => return Err(e.into()),
    }

    tokio::time::sleep(ctx.config.cancel_grace_period).await;

    match ctx.platform.delete_job(job_id).await {
        Ok(()) => debug!(job_id, "deleted job"),
        Err(e) if e.is_not_found() => debug!(job_id, "job already gone, nothing to delete"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
