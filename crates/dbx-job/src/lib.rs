//! DatabricksJob controller
//!
//! Drives each `DatabricksJob` through a small state machine derived from its
//! finalizer, deletion timestamp and submitted run ID:
//! - guard the resource with a finalizer
//! - sync referenced secrets into a secret scope and submit the run
//! - poll the run and mirror its state into status
//! - cancel and delete the run before the resource goes away

pub mod config;
pub mod controller;
pub mod error;
pub mod secrets;
pub mod store;
pub mod translator;

#[cfg(test)]
mod testing;

pub use config::{ClusterDefaults, JobControllerConfig};
pub use controller::{error_policy, reconcile, JobContext, JobState, JOB_FINALIZER};
pub use error::JobError;
pub use store::{JobStore, KubeJobStore};
