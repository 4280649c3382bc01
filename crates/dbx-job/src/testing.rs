//! Shared test fixtures

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;
use mockall::mock;

use dbx_common::crd::{
    CronScheduleSpec, DatabricksJob, DatabricksJobSpec, DatabricksJobStatus, NotebookTaskSpec,
    TaskSpec,
};
use dbx_platform::models::{CreateJob, RunInfo, SecretValue, SubmitRun};
use dbx_platform::{DatabricksApi, PlatformError};

mock! {
    pub Platform {}

    #[async_trait]
    impl DatabricksApi for Platform {
        async fn submit_run(&self, run: &SubmitRun) -> Result<i64, PlatformError>;
        async fn get_run(&self, run_id: i64) -> Result<RunInfo, PlatformError>;
        async fn cancel_run(&self, run_id: i64) -> Result<(), PlatformError>;
        async fn delete_run(&self, run_id: i64) -> Result<(), PlatformError>;
        async fn create_job(&self, job: &CreateJob) -> Result<i64, PlatformError>;
        async fn find_job_id(&self, name: &str, owner_uid: &str) -> Result<Option<i64>, PlatformError>;
        async fn latest_run(&self, job_id: i64) -> Result<Option<RunInfo>, PlatformError>;
        async fn cancel_all_runs(&self, job_id: i64) -> Result<(), PlatformError>;
        async fn delete_job(&self, job_id: i64) -> Result<(), PlatformError>;
        async fn create_secret_scope(
            &self,
            scope: &str,
            initial_manage_principal: &str,
        ) -> Result<(), PlatformError>;
        async fn put_secret(
            &self,
            scope: &str,
            key: &str,
            value: &SecretValue,
        ) -> Result<(), PlatformError>;
        async fn find_cluster_id(&self, cluster_name: &str) -> Result<Option<String>, PlatformError>;
    }
}

/// Notebook job `data/<name>` with uid and resourceVersion set
pub fn sample_job(name: &str) -> DatabricksJob {
    let mut job = DatabricksJob::new(
        name,
        DatabricksJobSpec {
            run_name: None,
            existing_cluster_id: None,
            existing_cluster_name: None,
            new_cluster: None,
            task: TaskSpec::Notebook(NotebookTaskSpec {
                notebook_path: "/Shared/etl".to_string(),
                base_parameters: BTreeMap::new(),
            }),
            libraries: vec![],
            secrets: vec![],
            timeout_seconds: None,
            max_retries: None,
            min_retry_interval_millis: None,
            retry_on_timeout: None,
            email_notifications: None,
            schedule: None,
            max_concurrent_runs: None,
        },
    );
    job.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("data".to_string()),
        uid: Some(format!("uid-{name}")),
        resource_version: Some("1".to_string()),
        ..Default::default()
    };
    job
}

/// Nightly recurring variant of [`sample_job`]
pub fn scheduled_job(name: &str) -> DatabricksJob {
    let mut job = sample_job(name);
    job.spec.schedule = Some(CronScheduleSpec {
        quartz_cron_expression: "0 15 2 * * ?".to_string(),
        timezone_id: "UTC".to_string(),
        pause_status: None,
    });
    job
}

pub fn with_finalizer(mut job: DatabricksJob, finalizer: &str) -> DatabricksJob {
    job.metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(finalizer.to_string());
    job
}

pub fn deleting(mut job: DatabricksJob) -> DatabricksJob {
    job.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
    job
}

pub fn with_status(mut job: DatabricksJob, status: DatabricksJobStatus) -> DatabricksJob {
    job.status = Some(status);
    job
}

pub fn secret(entries: &[(&str, &[u8])]) -> Secret {
    Secret {
        data: Some(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}
