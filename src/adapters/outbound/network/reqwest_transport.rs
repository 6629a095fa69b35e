use crate::ports::outbound::{HttpMethod, SignalRequest, SignalResponse, SignalTransport};
use crate::shared::error::FetchError;
use crate::shared::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// ReqwestTransport adapter executing signal requests over HTTP
///
/// The client-level timeout bounds every request, including reading the
/// body. Non-2xx statuses are returned as responses; only timeouts and
/// connection failures are errors here.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given user agent and timeout
    ///
    /// # Arguments
    /// * `user_agent` - Overrides the default `depwatch/<version>` agent
    /// * `timeout` - Per-request timeout
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Self> {
        let user_agent = user_agent
            .map(str::to_string)
            .unwrap_or_else(Self::default_user_agent);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    pub fn default_user_agent() -> String {
        format!("depwatch/{}", env!("CARGO_PKG_VERSION"))
    }

    fn classify(error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout
        } else if error.is_builder() {
            FetchError::InvalidRequest {
                details: error.to_string(),
            }
        } else {
            FetchError::Transport {
                details: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl SignalTransport for ReqwestTransport {
    async fn execute(&self, request: &SignalRequest) -> std::result::Result<SignalResponse, FetchError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = &request.auth_token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Malformed {
                    details: e.to_string(),
                }
            }
        })?;
        Ok(SignalResponse { status, body })
    }
}
