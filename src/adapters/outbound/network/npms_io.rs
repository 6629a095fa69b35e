use super::signal_fetcher::{checked_package_name, malformed, ParsedChunk, SignalEndpoint};
use crate::ports::outbound::SignalRequest;
use crate::risk_scoring::domain::QualityScore;
use crate::shared::error::FetchError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

pub const DEFAULT_NPMS_IO_URL: &str = "https://api.npms.io/v2/";

/// npms.io accepts at most this many names per mget request
pub const MAX_NPMS_BATCH: usize = 250;

#[derive(Debug, Deserialize)]
struct Analysis {
    #[serde(rename = "analyzedAt", default)]
    analyzed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    collected: Option<Collected>,
    score: Score,
}

#[derive(Debug, Deserialize)]
struct Collected {
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Score {
    #[serde(rename = "final")]
    final_score: f64,
    #[serde(default)]
    detail: Option<ScoreDetail>,
}

#[derive(Debug, Deserialize)]
struct ScoreDetail {
    quality: Option<f64>,
    popularity: Option<f64>,
    maintenance: Option<f64>,
}

/// npms.io bulk analysis endpoint, one POST per batch of names.
pub struct NpmsIoEndpoint {
    base_url: String,
}

impl NpmsIoEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn quality_score(name: &str, analysis: Analysis) -> QualityScore {
        let detail = analysis.score.detail;
        QualityScore {
            package_name: name.to_string(),
            package_version: analysis
                .collected
                .and_then(|collected| collected.metadata)
                .and_then(|metadata| metadata.version),
            score: analysis.score.final_score.clamp(0.0, 1.0),
            quality: detail.as_ref().and_then(|d| d.quality),
            popularity: detail.as_ref().and_then(|d| d.popularity),
            maintenance: detail.as_ref().and_then(|d| d.maintenance),
            analyzed_at: analysis.analyzed_at,
        }
    }
}

impl SignalEndpoint for NpmsIoEndpoint {
    type Payload = QualityScore;

    fn name(&self) -> &'static str {
        "npms_io"
    }

    fn batched(&self) -> bool {
        true
    }

    fn request(&self, identifiers: &[String]) -> Result<SignalRequest, FetchError> {
        for name in identifiers {
            checked_package_name(name)?;
        }
        Ok(SignalRequest::post_json(
            format!("{}package/mget", self.base_url),
            serde_json::json!(identifiers),
        ))
    }

    fn parse(&self, identifiers: &[String], body: &str) -> Result<ParsedChunk<QualityScore>, FetchError> {
        let mut analyses: HashMap<String, Option<Analysis>> =
            serde_json::from_str(body).map_err(malformed)?;

        let mut parsed = ParsedChunk::found(Vec::new());
        for name in identifiers {
            match analyses.remove(name).flatten() {
                Some(analysis) => parsed.found.push(Self::quality_score(name, analysis)),
                None => parsed.misses.push(name.clone()),
            }
        }
        Ok(parsed)
    }
}
