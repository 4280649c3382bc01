//! Databricks workspace client
//!
//! The [`DatabricksApi`] trait is the seam the job controller talks through;
//! [`HttpDatabricksClient`] implements it against the REST API.

#![deny(missing_docs)]

mod client;
mod config;
mod error;
pub mod models;

pub use client::{DatabricksApi, HttpDatabricksClient};
pub use config::DatabricksConfig;
pub use error::PlatformError;
