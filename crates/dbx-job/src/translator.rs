//! DatabricksJob spec to run submission or job creation payload
//!
//! Translation is pure: the same spec, cluster and defaults always produce the
//! same payload, and serializing it yields the same bytes. One-time runs and
//! recurring jobs carry the same single task.

use std::collections::BTreeMap;

use dbx_common::crd::{
    CronScheduleSpec, DatabricksJobSpec, EmailNotificationsSpec, LibraryKind, LibrarySpec,
    NewClusterSpec, TaskSpec,
};
use dbx_platform::models::{
    AutoScale, CreateJob, CronSchedule, EmailNotifications, Library, MavenLibrary, NewCluster,
    NotebookTask, PythonPyPiLibrary, RCranLibrary, SparkJarTask, SparkPythonTask, SparkSubmitTask,
    SubmitRun, SubmitTask, OWNER_UID_TAG,
};

use crate::config::ClusterDefaults;

/// Task key of the single task in every submitted run or registered job
pub const TASK_KEY: &str = "main";

/// Cluster the run executes on, after any name lookup
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedCluster<'a> {
    /// Existing cluster ID
    Existing(String),
    /// New cluster built from defaults and optional overrides
    New(Option<&'a NewClusterSpec>),
}

/// Inputs that do not come from the spec itself
#[derive(Clone, Copy, Debug)]
pub struct SubmissionContext<'a> {
    /// Run or job display name
    pub run_name: &'a str,
    /// UID of the owning resource: the run's idempotency token, or the
    /// job's owner tag
    pub owner_uid: Option<&'a str>,
    /// Cluster template
    pub defaults: &'a ClusterDefaults,
}

/// Build the one-time run submission payload for a job
pub fn translate(
    spec: &DatabricksJobSpec,
    cluster: &ResolvedCluster<'_>,
    ctx: SubmissionContext<'_>,
) -> SubmitRun {
    SubmitRun {
        run_name: ctx.run_name.to_string(),
        timeout_seconds: spec.timeout_seconds.filter(|t| *t > 0),
        idempotency_token: ctx.owner_uid.map(str::to_string),
        email_notifications: spec.email_notifications.as_ref().and_then(notifications),
        tasks: vec![task(spec, cluster, ctx.defaults)],
    }
}

/// Build the recurring job payload for a job with a schedule
pub fn translate_job(
    spec: &DatabricksJobSpec,
    cluster: &ResolvedCluster<'_>,
    ctx: SubmissionContext<'_>,
) -> CreateJob {
    let tags = ctx
        .owner_uid
        .map(|uid| BTreeMap::from([(OWNER_UID_TAG.to_string(), uid.to_string())]))
        .unwrap_or_default();

    CreateJob {
        name: ctx.run_name.to_string(),
        timeout_seconds: spec.timeout_seconds.filter(|t| *t > 0),
        email_notifications: spec.email_notifications.as_ref().and_then(notifications),
        schedule: spec.schedule.as_ref().map(schedule),
        max_concurrent_runs: spec.max_concurrent_runs,
        tags,
        tasks: vec![task(spec, cluster, ctx.defaults)],
    }
}

fn task(
    spec: &DatabricksJobSpec,
    cluster: &ResolvedCluster<'_>,
    defaults: &ClusterDefaults,
) -> SubmitTask {
    let (existing_cluster_id, new_cluster) = match cluster {
        ResolvedCluster::Existing(id) => (Some(id.clone()), None),
        ResolvedCluster::New(overrides) => (None, Some(new_cluster(*overrides, defaults))),
    };

    let mut task = SubmitTask {
        task_key: TASK_KEY.to_string(),
        existing_cluster_id,
        new_cluster,
        libraries: spec.libraries.iter().map(library).collect(),
        max_retries: spec.max_retries,
        min_retry_interval_millis: spec.min_retry_interval_millis,
        retry_on_timeout: spec.retry_on_timeout,
        ..Default::default()
    };
    match &spec.task {
        TaskSpec::Notebook(t) => {
            task.notebook_task = Some(NotebookTask {
                notebook_path: t.notebook_path.clone(),
                base_parameters: t.base_parameters.clone(),
            })
        }
        TaskSpec::SparkJar(t) => {
            task.spark_jar_task = Some(SparkJarTask {
                main_class_name: t.main_class_name.clone(),
                parameters: t.parameters.clone(),
            })
        }
        TaskSpec::SparkPython(t) => {
            task.spark_python_task = Some(SparkPythonTask {
                python_file: t.python_file.clone(),
                parameters: t.parameters.clone(),
            })
        }
        TaskSpec::SparkSubmit(t) => {
            task.spark_submit_task = Some(SparkSubmitTask {
                parameters: t.parameters.clone(),
            })
        }
    }
    task
}

fn schedule(spec: &CronScheduleSpec) -> CronSchedule {
    CronSchedule {
        quartz_cron_expression: spec.quartz_cron_expression.clone(),
        timezone_id: spec.timezone_id.clone(),
        pause_status: spec.pause_status,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Defaults overridden field by field; maps are merged with spec keys winning
fn new_cluster(overrides: Option<&NewClusterSpec>, defaults: &ClusterDefaults) -> NewCluster {
    let mut cluster = NewCluster {
        spark_version: defaults.spark_version.clone(),
        node_type_id: defaults.node_type_id.clone(),
        num_workers: Some(defaults.num_workers),
        spark_env_vars: defaults.spark_env_vars.clone(),
        ..Default::default()
    };
    let Some(spec) = overrides else {
        return cluster;
    };

    if let Some(version) = non_empty(&spec.spark_version) {
        cluster.spark_version = version;
    }
    if let Some(node_type) = non_empty(&spec.node_type_id) {
        cluster.node_type_id = node_type;
    }
    cluster.driver_node_type_id = non_empty(&spec.driver_node_type_id);
    if let Some(workers) = spec.num_workers {
        cluster.num_workers = Some(workers);
    }
    // The platform rejects num_workers alongside autoscale
    if let Some(auto) = &spec.autoscale {
        cluster.autoscale = Some(AutoScale {
            min_workers: auto.min_workers,
            max_workers: auto.max_workers,
        });
        cluster.num_workers = None;
    }
    cluster.spark_conf.extend(spec.spark_conf.clone());
    cluster.spark_env_vars.extend(spec.spark_env_vars.clone());
    cluster.custom_tags.extend(spec.custom_tags.clone());
    cluster
}

fn library(spec: &LibrarySpec) -> Library {
    match spec.kind {
        LibraryKind::Jar => Library {
            jar: optional(&spec.path),
            ..Default::default()
        },
        LibraryKind::Egg => Library {
            egg: optional(&spec.path),
            ..Default::default()
        },
        LibraryKind::Whl => Library {
            whl: optional(&spec.path),
            ..Default::default()
        },
        LibraryKind::Pypi => Library {
            pypi: Some(PythonPyPiLibrary {
                package: spec.package.clone(),
                repo: optional(&spec.repo),
            }),
            ..Default::default()
        },
        LibraryKind::Maven => Library {
            maven: Some(MavenLibrary {
                coordinates: spec.coordinates.clone(),
                repo: optional(&spec.repo),
                exclusions: spec.exclusions.clone(),
            }),
            ..Default::default()
        },
        LibraryKind::Cran => Library {
            cran: Some(RCranLibrary {
                package: spec.package.clone(),
                repo: optional(&spec.repo),
            }),
            ..Default::default()
        },
    }
}

fn notifications(spec: &EmailNotificationsSpec) -> Option<EmailNotifications> {
    if spec.on_start.is_empty() && spec.on_success.is_empty() && spec.on_failure.is_empty() {
        return None;
    }
    Some(EmailNotifications {
        on_start: spec.on_start.clone(),
        on_success: spec.on_success.clone(),
        on_failure: spec.on_failure.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbx_common::crd::{
        AutoScaleSpec, NotebookTaskSpec, PauseStatus, SparkJarTaskSpec, SparkPythonTaskSpec,
        SparkSubmitTaskSpec,
    };
    use serde_json::json;
    use std::collections::BTreeMap;

    fn spec(task: TaskSpec) -> DatabricksJobSpec {
        DatabricksJobSpec {
            run_name: None,
            existing_cluster_id: None,
            existing_cluster_name: None,
            new_cluster: None,
            task,
            libraries: vec![],
            secrets: vec![],
            timeout_seconds: None,
            max_retries: None,
            min_retry_interval_millis: None,
            retry_on_timeout: None,
            email_notifications: None,
            schedule: None,
            max_concurrent_runs: None,
        }
    }

    fn notebook() -> TaskSpec {
        TaskSpec::Notebook(NotebookTaskSpec {
            notebook_path: "/Shared/etl".to_string(),
            base_parameters: BTreeMap::from([
                ("date".to_string(), "2024-01-01".to_string()),
                ("env".to_string(), "prod".to_string()),
            ]),
        })
    }

    fn ctx(defaults: &ClusterDefaults) -> SubmissionContext<'_> {
        SubmissionContext {
            run_name: "etl-1",
            owner_uid: Some("uid-1"),
            defaults,
        }
    }

    #[test]
    fn default_cluster_comes_from_template() {
        let defaults = ClusterDefaults::default();
        let run = translate(&spec(notebook()), &ResolvedCluster::New(None), ctx(&defaults));

        let task = &run.tasks[0];
        assert_eq!(task.task_key, TASK_KEY);
        let cluster = task.new_cluster.as_ref().unwrap();
        assert_eq!(cluster.spark_version, "5.2.x-scala2.11");
        assert_eq!(cluster.node_type_id, "Standard_DS3_v2");
        assert_eq!(cluster.num_workers, Some(3));
        assert_eq!(
            cluster.spark_env_vars.get("PYSPARK_PYTHON").map(String::as_str),
            Some("/databricks/python3/bin/python3")
        );
        assert_eq!(run.idempotency_token.as_deref(), Some("uid-1"));
        assert_eq!(run.run_name, "etl-1");
    }

    #[test]
    fn spec_overrides_defaults_field_by_field() {
        let defaults = ClusterDefaults::default();
        let overrides = NewClusterSpec {
            spark_version: Some("13.3.x-scala2.12".to_string()),
            node_type_id: Some(String::new()),
            autoscale: Some(AutoScaleSpec {
                min_workers: 1,
                max_workers: 4,
            }),
            spark_env_vars: BTreeMap::from([
                ("PYSPARK_PYTHON".to_string(), "/usr/bin/python3".to_string()),
                ("STAGE".to_string(), "dev".to_string()),
            ]),
            custom_tags: BTreeMap::from([("team".to_string(), "data".to_string())]),
            ..Default::default()
        };
        let run = translate(
            &spec(notebook()),
            &ResolvedCluster::New(Some(&overrides)),
            ctx(&defaults),
        );

        let cluster = run.tasks[0].new_cluster.as_ref().unwrap();
        assert_eq!(cluster.spark_version, "13.3.x-scala2.12");
        // Empty strings do not override
        assert_eq!(cluster.node_type_id, "Standard_DS3_v2");
        assert_eq!(cluster.num_workers, None);
        assert_eq!(
            cluster.autoscale,
            Some(AutoScale {
                min_workers: 1,
                max_workers: 4
            })
        );
        assert_eq!(cluster.spark_env_vars.len(), 2);
        assert_eq!(cluster.spark_env_vars["PYSPARK_PYTHON"], "/usr/bin/python3");
        assert_eq!(cluster.custom_tags["team"], "data");
    }

    #[test]
    fn existing_cluster_passes_through() {
        let defaults = ClusterDefaults::default();
        let run = translate(
            &spec(notebook()),
            &ResolvedCluster::Existing("0101-abc".to_string()),
            ctx(&defaults),
        );
        assert_eq!(run.tasks[0].existing_cluster_id.as_deref(), Some("0101-abc"));
        assert!(run.tasks[0].new_cluster.is_none());
    }

    #[test]
    fn every_task_kind_sets_its_own_field() {
        let defaults = ClusterDefaults::default();
        let cluster = ResolvedCluster::Existing("c".to_string());
        let tasks = [
            notebook(),
            TaskSpec::SparkJar(SparkJarTaskSpec {
                main_class_name: "com.example.Main".to_string(),
                parameters: vec!["--full".to_string()],
            }),
            TaskSpec::SparkPython(SparkPythonTaskSpec {
                python_file: "dbfs:/jobs/run.py".to_string(),
                parameters: vec![],
            }),
            TaskSpec::SparkSubmit(SparkSubmitTaskSpec {
                parameters: vec!["--class".to_string(), "Main".to_string()],
            }),
        ];
        let expected = [
            "notebook_task",
            "spark_jar_task",
            "spark_python_task",
            "spark_submit_task",
        ];

        for (task, field) in tasks.into_iter().zip(expected) {
            let run = translate(&spec(task), &cluster, ctx(&defaults));
            let body = serde_json::to_value(&run.tasks[0]).unwrap();
            let set: Vec<&str> = expected
                .iter()
                .copied()
                .filter(|f| body.get(*f).is_some())
                .collect();
            assert_eq!(set, vec![field]);
        }
    }

    #[test]
    fn each_library_kind_populates_exactly_its_field() {
        let defaults = ClusterDefaults::default();
        let mut job = spec(notebook());
        job.libraries = vec![
            LibrarySpec::new(LibraryKind::Jar).with_path("dbfs:/a.jar"),
            LibrarySpec::new(LibraryKind::Egg).with_path("dbfs:/b.egg"),
            LibrarySpec::new(LibraryKind::Whl).with_path("dbfs:/c.whl"),
            LibrarySpec::new(LibraryKind::Pypi).with_package("simplejson==3.8.0"),
            LibrarySpec {
                exclusions: vec!["slf4j:slf4j".to_string()],
                ..LibrarySpec::new(LibraryKind::Maven)
                    .with_coordinates("org.jsoup:jsoup:1.7.2")
                    .with_repo("https://repo.example.com")
            },
            LibrarySpec::new(LibraryKind::Cran).with_package("ada"),
        ];

        let run = translate(&job, &ResolvedCluster::New(None), ctx(&defaults));
        let libraries = serde_json::to_value(&run.tasks[0].libraries).unwrap();
        assert_eq!(
            libraries,
            json!([
                {"jar": "dbfs:/a.jar"},
                {"egg": "dbfs:/b.egg"},
                {"whl": "dbfs:/c.whl"},
                {"pypi": {"package": "simplejson==3.8.0"}},
                {"maven": {
                    "coordinates": "org.jsoup:jsoup:1.7.2",
                    "repo": "https://repo.example.com",
                    "exclusions": ["slf4j:slf4j"]
                }},
                {"cran": {"package": "ada"}}
            ])
        );
    }

    #[test]
    fn retry_and_timeout_settings_are_carried() {
        let defaults = ClusterDefaults::default();
        let mut job = spec(notebook());
        job.timeout_seconds = Some(3600);
        job.max_retries = Some(2);
        job.min_retry_interval_millis = Some(60_000);
        job.retry_on_timeout = Some(true);
        job.email_notifications = Some(EmailNotificationsSpec {
            on_failure: vec!["oncall@example.com".to_string()],
            ..Default::default()
        });

        let run = translate(&job, &ResolvedCluster::New(None), ctx(&defaults));
        assert_eq!(run.timeout_seconds, Some(3600));
        assert_eq!(run.tasks[0].max_retries, Some(2));
        assert_eq!(run.tasks[0].min_retry_interval_millis, Some(60_000));
        assert_eq!(run.tasks[0].retry_on_timeout, Some(true));
        assert_eq!(
            run.email_notifications.unwrap().on_failure,
            vec!["oncall@example.com".to_string()]
        );
    }

    #[test]
    fn empty_notifications_and_zero_timeout_are_omitted() {
        let defaults = ClusterDefaults::default();
        let mut job = spec(notebook());
        job.timeout_seconds = Some(0);
        job.email_notifications = Some(EmailNotificationsSpec::default());

        let run = translate(&job, &ResolvedCluster::New(None), ctx(&defaults));
        assert_eq!(run.timeout_seconds, None);
        assert!(run.email_notifications.is_none());
    }

    #[test]
    fn recurring_job_carries_schedule_owner_tag_and_same_task() {
        let defaults = ClusterDefaults::default();
        let mut job = spec(notebook());
        job.timeout_seconds = Some(600);
        job.max_retries = Some(1);
        job.max_concurrent_runs = Some(3);
        job.schedule = Some(CronScheduleSpec {
            quartz_cron_expression: "0 15 2 * * ?".to_string(),
            timezone_id: "Europe/London".to_string(),
            pause_status: Some(PauseStatus::Paused),
        });
        let cluster = ResolvedCluster::Existing("0101-abc".to_string());

        let created = translate_job(&job, &cluster, ctx(&defaults));
        assert_eq!(created.name, "etl-1");
        assert_eq!(created.timeout_seconds, Some(600));
        assert_eq!(created.max_concurrent_runs, Some(3));
        assert_eq!(created.tags[OWNER_UID_TAG], "uid-1");
        let schedule = created.schedule.as_ref().unwrap();
        assert_eq!(schedule.quartz_cron_expression, "0 15 2 * * ?");
        assert_eq!(schedule.timezone_id, "Europe/London");
        assert_eq!(schedule.pause_status, Some(PauseStatus::Paused));

        let run = translate(&job, &cluster, ctx(&defaults));
        assert_eq!(created.tasks, run.tasks);
    }

    #[test]
    fn recurring_job_without_owner_has_no_tags() {
        let defaults = ClusterDefaults::default();
        let created = translate_job(
            &spec(notebook()),
            &ResolvedCluster::New(None),
            SubmissionContext {
                run_name: "etl-1",
                owner_uid: None,
                defaults: &defaults,
            },
        );
        assert!(created.tags.is_empty());
        assert!(created.schedule.is_none());
    }

    #[test]
    fn translation_is_byte_identical_across_calls() {
        let defaults = ClusterDefaults::default();
        let mut job = spec(notebook());
        job.new_cluster = Some(NewClusterSpec {
            spark_conf: BTreeMap::from([
                ("spark.b".to_string(), "2".to_string()),
                ("spark.a".to_string(), "1".to_string()),
            ]),
            ..Default::default()
        });
        let cluster = ResolvedCluster::New(job.new_cluster.as_ref());

        let first = serde_json::to_vec(&translate(&job, &cluster, ctx(&defaults))).unwrap();
        let second = serde_json::to_vec(&translate(&job, &cluster, ctx(&defaults))).unwrap();
        assert_eq!(first, second);
    }
}
