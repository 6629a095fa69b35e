use crate::shared::error::FetchError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound request to a metadata endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<serde_json::Value>,
    /// Sent as a bearer token
    pub auth_token: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl SignalRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
            auth_token: None,
            headers: Vec::new(),
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            body: Some(body),
            auth_token: None,
            headers: Vec::new(),
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response; any HTTP status is a successful exchange at this level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalResponse {
    pub status: u16,
    pub body: String,
}

/// SignalTransport port for the HTTP exchange behind metadata fetches
///
/// Implementations apply the per-request timeout and report timeouts and
/// connection failures as [`FetchError`] values.
#[async_trait]
pub trait SignalTransport: Send + Sync {
    async fn execute(&self, request: &SignalRequest) -> Result<SignalResponse, FetchError>;
}
