//! Error type shared by the operator crates
//!
//! Validation errors name the job and the offending field path so they read
//! well in a Warning event without further wrapping.

use thiserror::Error;

/// Errors raised by CRD validation, CRD rendering and operator setup
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API call failed
    #[error("kubernetes error: {source}")]
    Kube {
        /// Error returned by the kube client
        #[from]
        source: kube::Error,
    },

    /// A DatabricksJob spec cannot be submitted as written
    #[error("invalid job {job}: {field}: {message}")]
    Validation {
        /// Job name
        job: String,
        /// Field path, e.g. `spec.task.notebook.notebookPath`
        field: String,
        /// What is wrong with the field
        message: String,
    },

    /// A manifest could not be rendered
    #[error("failed to serialize {kind}: {message}")]
    Serialization {
        /// Kind being rendered
        kind: String,
        /// Serializer message
        message: String,
    },

    /// Invalid operator configuration or setup failure
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Subsystem, e.g. "config" or "telemetry"
        context: String,
        /// What failed
        message: String,
    },
}

impl Error {
    /// Validation failure of `field` in `job`
    pub fn validation_for_field(
        job: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            job: job.into(),
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Rendering failure for a resource kind
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Failure inside an operator subsystem
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Field path of a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_job_and_field() {
        let err = Error::validation_for_field(
            "etl-1",
            "spec.task.notebook.notebookPath",
            "must not be empty",
        );
        assert_eq!(
            err.to_string(),
            "invalid job etl-1: spec.task.notebook.notebookPath: must not be empty"
        );
        assert_eq!(err.field(), Some("spec.task.notebook.notebookPath"));
    }

    #[test]
    fn kube_errors_convert() {
        let err = Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }));
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.field().is_none());
    }

    #[test]
    fn serialization_error_names_kind() {
        let err = Error::serialization_for_kind("CustomResourceDefinition", "bad yaml");
        assert_eq!(
            err.to_string(),
            "failed to serialize CustomResourceDefinition: bad yaml"
        );
    }

    #[test]
    fn internal_error_keeps_context() {
        let err = Error::internal_with_context("telemetry", "exporter unavailable");
        assert_eq!(err.to_string(), "internal error [telemetry]: exporter unavailable");
    }
}
