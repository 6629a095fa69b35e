use crate::shared::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A unit of sandboxed work for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub image_name: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Sandbox-side retry limit for the job's pod
    pub backoff_limit: u32,
    pub namespace: String,
}

/// JobSandbox port for submitting jobs to the external execution environment
///
/// The sandbox runs package-manager commands asynchronously and reports
/// through the result delivery channel; submission only returns the
/// sandbox's job identifier.
#[async_trait]
pub trait JobSandbox: Send + Sync {
    /// Submits one job.
    ///
    /// # Returns
    /// The job identifier assigned by the sandbox. Result envelopes carry it
    /// as their `JOB_NAME` attribute.
    ///
    /// # Errors
    /// Returns an error if the sandbox rejects or cannot receive the job.
    async fn submit(&self, spec: &JobSpec) -> Result<String>;
}
