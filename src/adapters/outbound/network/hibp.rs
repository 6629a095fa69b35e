use super::signal_fetcher::{malformed, ParsedChunk, SignalEndpoint};
use crate::ports::outbound::SignalRequest;
use crate::risk_scoring::domain::BreachRecord;
use crate::shared::error::FetchError;
use serde::Deserialize;

pub const DEFAULT_HIBP_URL: &str = "https://haveibeenpwned.com/api/v3/";

const API_KEY_HEADER: &str = "hibp-api-key";

#[derive(Debug, Deserialize)]
struct Breach {
    #[serde(rename = "Name")]
    name: String,
}

/// Have I Been Pwned breached-account endpoint, one request per account.
pub struct HibpEndpoint {
    base_url: String,
    api_key: Option<String>,
}

impl HibpEndpoint {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }
}

impl SignalEndpoint for HibpEndpoint {
    type Payload = BreachRecord;

    fn name(&self) -> &'static str {
        "hibp"
    }

    fn request(&self, identifiers: &[String]) -> Result<SignalRequest, FetchError> {
        let account = identifiers
            .first()
            .filter(|account| !account.trim().is_empty())
            .ok_or_else(|| FetchError::InvalidRequest {
                details: "empty account".to_string(),
            })?;
        let request = SignalRequest::get(format!(
            "{}breachedaccount/{}?truncateResponse=true",
            self.base_url,
            urlencoding::encode(account)
        ));
        Ok(match &self.api_key {
            Some(key) => request.with_header(API_KEY_HEADER, key.clone()),
            None => request,
        })
    }

    fn parse(&self, identifiers: &[String], body: &str) -> Result<ParsedChunk<BreachRecord>, FetchError> {
        let breaches: Vec<Breach> = serde_json::from_str(body).map_err(malformed)?;
        let account = identifiers.first().cloned().unwrap_or_default();
        Ok(ParsedChunk::found(vec![BreachRecord {
            account,
            breach_names: breaches.into_iter().map(|breach| breach.name).collect(),
        }]))
    }
}
