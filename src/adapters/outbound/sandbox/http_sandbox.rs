use crate::ports::outbound::{JobSandbox, JobSpec};
use crate::shared::Result;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct SubmittedJob {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// HttpJobSandbox adapter submitting job specs to the sandbox's HTTP API
///
/// Each spec is POSTed as JSON. The sandbox answers with the identifier it
/// assigned; an empty or unrecognized body falls back to the spec's name.
pub struct HttpJobSandbox {
    client: reqwest::Client,
    submit_url: String,
    auth_token: Option<String>,
}

impl HttpJobSandbox {
    pub fn new(submit_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("depwatch/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            submit_url: submit_url.into(),
            auth_token,
        })
    }

    fn job_id(spec: &JobSpec, body: &str) -> String {
        let submitted: SubmittedJob = serde_json::from_str(body).unwrap_or_default();
        submitted
            .id
            .or(submitted.name)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| spec.name.clone())
    }
}

#[async_trait]
impl JobSandbox for HttpJobSandbox {
    async fn submit(&self, spec: &JobSpec) -> Result<String> {
        let mut request = self.client.post(&self.submit_url).json(spec);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach sandbox at {}", self.submit_url))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Sandbox returned status code {}: {}", status, body.trim());
        }

        let job_id = Self::job_id(spec, &body);
        debug!(job = %spec.name, %job_id, "job accepted by sandbox");
        Ok(job_id)
    }
}
