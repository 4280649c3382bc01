//! Common types for the Databricks operator: CRDs, errors, events and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;
pub use events::{EventPublisher, JobEvent, KubeEventPublisher, NoopEventPublisher};

/// API group for all operator CRDs
pub const API_GROUP: &str = "databricks.microsoft.com";

/// Label key marking resources created by the operator
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Label value for [`LABEL_MANAGED_BY`]
pub const LABEL_MANAGED_BY_OPERATOR: &str = "databricks-operator";
