use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Envelope attribute naming the job that produced a result.
pub const JOB_NAME_ATTRIBUTE: &str = "JOB_NAME";

/// Output of one task run inside a sandbox job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    /// Environment the job ran with (`PACKAGE_MANAGER`, `LANGUAGE`, ...)
    #[serde(default)]
    pub envvar_args: BTreeMap<String, String>,
}

/// One typed line of a result payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskLine {
    TaskResult(TaskResult),
    TaskComplete,
    #[serde(other)]
    Unknown,
}

/// A result message as delivered by the at-least-once channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub message_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Vec<TaskLine>,
    #[serde(default)]
    pub publish_time: Option<DateTime<Utc>>,
}

impl ResultEnvelope {
    pub fn job_name(&self) -> Option<&str> {
        self.attributes.get(JOB_NAME_ATTRIBUTE).map(String::as_str)
    }

    pub fn is_job_complete(&self) -> bool {
        self.data.iter().any(|line| matches!(line, TaskLine::TaskComplete))
    }

    pub fn task_results(&self) -> impl Iterator<Item = &TaskResult> {
        self.data.iter().filter_map(|line| match line {
            TaskLine::TaskResult(result) => Some(result),
            _ => None,
        })
    }
}

/// Received job results, keyed by message id.
///
/// [`ResultInbox::apply`] is an idempotent reducer: applying the same
/// envelope any number of times, in any order relative to others, yields the
/// same state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultInbox {
    envelopes: BTreeMap<String, ResultEnvelope>,
    completed_jobs: BTreeSet<String>,
}

impl ResultInbox {
    pub fn apply(mut self, envelope: ResultEnvelope) -> Self {
        if self.envelopes.contains_key(&envelope.message_id) {
            return self;
        }
        if envelope.is_job_complete() {
            if let Some(job_name) = envelope.job_name() {
                self.completed_jobs.insert(job_name.to_string());
            }
        }
        self.envelopes.insert(envelope.message_id.clone(), envelope);
        self
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.envelopes.contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn is_job_complete(&self, job_name: &str) -> bool {
        self.completed_jobs.contains(job_name)
    }

    /// Envelopes for one job in message-id order.
    pub fn envelopes_for_job<'a>(
        &'a self,
        job_name: &'a str,
    ) -> impl Iterator<Item = &'a ResultEnvelope> + 'a {
        self.envelopes
            .values()
            .filter(move |envelope| envelope.job_name() == Some(job_name))
    }
}
