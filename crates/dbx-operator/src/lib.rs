//! Databricks operator - process wiring for the DatabricksJob controller

pub mod cli;
pub mod controller_runner;
pub mod crd;
