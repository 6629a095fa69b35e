use async_trait::async_trait;
use depwatch::ports::outbound::{SignalRequest, SignalResponse, SignalTransport};
use depwatch::prelude::FetchError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Mock SignalTransport answering fixed responses by URL; unknown URLs are 404
#[derive(Default)]
pub struct MockTransport {
    pub responses: HashMap<String, (u16, String)>,
    pub requested: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

#[async_trait]
impl SignalTransport for MockTransport {
    async fn execute(&self, request: &SignalRequest) -> Result<SignalResponse, FetchError> {
        self.requested.lock().unwrap().push(request.url.clone());
        let (status, body) = self
            .responses
            .get(&request.url)
            .cloned()
            .unwrap_or((404, String::new()));
        Ok(SignalResponse { status, body })
    }
}
