//! REST client for a Databricks workspace

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::models::{
    ClusterList, CreateJob, CreateJobResponse, CreateScopeRequest, JobIdRequest, JobList,
    RunIdRequest, RunInfo, RunList, SecretValue, SubmitRun, SubmitRunResponse,
};
use crate::{DatabricksConfig, PlatformError};

const RUNS_SUBMIT: &str = "api/2.1/jobs/runs/submit";
const RUNS_GET: &str = "api/2.1/jobs/runs/get";
const RUNS_CANCEL: &str = "api/2.1/jobs/runs/cancel";
const RUNS_DELETE: &str = "api/2.1/jobs/runs/delete";
const RUNS_LIST: &str = "api/2.1/jobs/runs/list";
const RUNS_CANCEL_ALL: &str = "api/2.1/jobs/runs/cancel-all";
const JOBS_CREATE: &str = "api/2.1/jobs/create";
const JOBS_LIST: &str = "api/2.1/jobs/list";
const JOBS_DELETE: &str = "api/2.1/jobs/delete";
const SCOPES_CREATE: &str = "api/2.0/secrets/scopes/create";
const SECRETS_PUT: &str = "api/2.0/secrets/put";
const CLUSTERS_LIST: &str = "api/2.0/clusters/list";

/// Operations the job controller needs from a workspace
#[async_trait]
pub trait DatabricksApi: Send + Sync {
    /// Submit a one-time run and return its ID
    async fn submit_run(&self, run: &SubmitRun) -> Result<i64, PlatformError>;

    /// Fetch a run's current state
    async fn get_run(&self, run_id: i64) -> Result<RunInfo, PlatformError>;

    /// Request cancellation of a run
    async fn cancel_run(&self, run_id: i64) -> Result<(), PlatformError>;

    /// Delete a finished or cancelled run
    async fn delete_run(&self, run_id: i64) -> Result<(), PlatformError>;

    /// Register a recurring job and return its ID
    async fn create_job(&self, job: &CreateJob) -> Result<i64, PlatformError>;

    /// Find a job named `name` registered by the resource with `owner_uid`
    async fn find_job_id(&self, name: &str, owner_uid: &str) -> Result<Option<i64>, PlatformError>;

    /// Most recently started run of a job, `None` before its first run
    async fn latest_run(&self, job_id: i64) -> Result<Option<RunInfo>, PlatformError>;

    /// Request cancellation of every active run of a job
    async fn cancel_all_runs(&self, job_id: i64) -> Result<(), PlatformError>;

    /// Delete a job together with its schedule
    async fn delete_job(&self, job_id: i64) -> Result<(), PlatformError>;

    /// Create a workspace-backed secret scope
    async fn create_secret_scope(
        &self,
        scope: &str,
        initial_manage_principal: &str,
    ) -> Result<(), PlatformError>;

    /// Create or overwrite one secret in a scope
    async fn put_secret(
        &self,
        scope: &str,
        key: &str,
        value: &SecretValue,
    ) -> Result<(), PlatformError>;

    /// Look up a cluster ID by cluster name
    async fn find_cluster_id(&self, cluster_name: &str) -> Result<Option<String>, PlatformError>;
}

/// [`DatabricksApi`] over HTTPS with bearer-token authentication
pub struct HttpDatabricksClient {
    http: reqwest::Client,
    base: Url,
    token: Zeroizing<String>,
}

impl HttpDatabricksClient {
    /// Build a client for the configured workspace
    pub fn new(config: &DatabricksConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("databricks-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base: config.host.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, PlatformError> {
        self.base
            .join(path)
            .map_err(|e| PlatformError::Config(format!("invalid endpoint {path}: {e}")))
    }

    async fn post<B, R>(&self, operation: &'static str, path: &str, body: &B) -> Result<R, PlatformError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let request = self.http.post(self.url(path)?).json(body);
        self.send(operation, request).await
    }

    async fn get<R>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, PlatformError>
    where
        R: DeserializeOwned,
    {
        let request = self.http.get(self.url(path)?).query(query);
        self.send(operation, request).await
    }

    async fn send<R>(&self, operation: &'static str, request: RequestBuilder) -> Result<R, PlatformError>
    where
        R: DeserializeOwned,
    {
        let response = request
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .map_err(|source| PlatformError::Transport { operation, source })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| PlatformError::Transport { operation, source })?;
        debug!(operation, status = status.as_u16(), "databricks API response");

        if !status.is_success() {
            return Err(PlatformError::from_response(operation, status.as_u16(), &body));
        }

        // Some endpoints answer an empty body instead of `{}`
        let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &body
        };
        serde_json::from_slice(body).map_err(|e| PlatformError::Malformed {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl DatabricksApi for HttpDatabricksClient {
    async fn submit_run(&self, run: &SubmitRun) -> Result<i64, PlatformError> {
        let response: SubmitRunResponse = self.post("submit run", RUNS_SUBMIT, run).await?;
        Ok(response.run_id)
    }

    async fn get_run(&self, run_id: i64) -> Result<RunInfo, PlatformError> {
        self.get("get run", RUNS_GET, &[("run_id", run_id.to_string())])
            .await
    }

    async fn cancel_run(&self, run_id: i64) -> Result<(), PlatformError> {
        let _: IgnoredAny = self
            .post("cancel run", RUNS_CANCEL, &RunIdRequest { run_id })
            .await?;
        Ok(())
    }

    async fn delete_run(&self, run_id: i64) -> Result<(), PlatformError> {
        let _: IgnoredAny = self
            .post("delete run", RUNS_DELETE, &RunIdRequest { run_id })
            .await?;
        Ok(())
    }

    async fn create_job(&self, job: &CreateJob) -> Result<i64, PlatformError> {
        let response: CreateJobResponse = self.post("create job", JOBS_CREATE, job).await?;
        Ok(response.job_id)
    }

    async fn find_job_id(&self, name: &str, owner_uid: &str) -> Result<Option<i64>, PlatformError> {
        let list: JobList = self
            .get("list jobs", JOBS_LIST, &[("name", name.to_string())])
            .await?;
        Ok(list
            .jobs
            .into_iter()
            .find(|job| job.is_owned_by(owner_uid))
            .map(|job| job.job_id))
    }

    async fn latest_run(&self, job_id: i64) -> Result<Option<RunInfo>, PlatformError> {
        let list: RunList = self
            .get(
                "list runs",
                RUNS_LIST,
                &[("job_id", job_id.to_string()), ("limit", "1".to_string())],
            )
            .await?;
        Ok(list.runs.into_iter().next())
    }

    async fn cancel_all_runs(&self, job_id: i64) -> Result<(), PlatformError> {
        let _: IgnoredAny = self
            .post("cancel all runs", RUNS_CANCEL_ALL, &JobIdRequest { job_id })
            .await?;
        Ok(())
    }

    async fn delete_job(&self, job_id: i64) -> Result<(), PlatformError> {
        let _: IgnoredAny = self
            .post("delete job", JOBS_DELETE, &JobIdRequest { job_id })
            .await?;
        Ok(())
    }

    async fn create_secret_scope(
        &self,
        scope: &str,
        initial_manage_principal: &str,
    ) -> Result<(), PlatformError> {
        let request = CreateScopeRequest {
            scope,
            initial_manage_principal,
        };
        let _: IgnoredAny = self
            .post("create secret scope", SCOPES_CREATE, &request)
            .await?;
        Ok(())
    }

    async fn put_secret(
        &self,
        scope: &str,
        key: &str,
        value: &SecretValue,
    ) -> Result<(), PlatformError> {
        let _: IgnoredAny = self
            .post("put secret", SECRETS_PUT, &value.request(scope, key))
            .await?;
        Ok(())
    }

    async fn find_cluster_id(&self, cluster_name: &str) -> Result<Option<String>, PlatformError> {
        let list: ClusterList = self.get("list clusters", CLUSTERS_LIST, &[]).await?;
        Ok(list
            .clusters
            .into_iter()
            .find(|c| c.cluster_name == cluster_name)
            .map(|c| c.cluster_id))
    }
}
