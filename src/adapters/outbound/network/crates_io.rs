use super::signal_fetcher::{checked_package_name, malformed, ParsedChunk, SignalEndpoint};
use crate::ports::outbound::SignalRequest;
use crate::risk_scoring::domain::{Language, QualityScore, RegistryEntry};
use crate::shared::error::FetchError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_CRATES_IO_URL: &str = "https://crates.io/";

/// Lifetime downloads that map to a popularity of 1.0
const SATURATED_DOWNLOADS: f64 = 1e8;
/// Downloads over the last 90 days that map to a maintenance of 1.0
const SATURATED_RECENT_DOWNLOADS: f64 = 1e6;

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
    #[serde(default)]
    versions: Vec<CrateVersion>,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    name: String,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    downloads: Option<u64>,
    #[serde(default)]
    recent_downloads: Option<u64>,
    #[serde(default)]
    max_version: Option<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CrateVersion {
    num: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    dl_path: Option<String>,
    #[serde(default)]
    published_by: Option<Publisher>,
}

#[derive(Debug, Deserialize)]
struct Publisher {
    login: String,
}

/// crates.io crate endpoint, one request per crate.
pub struct CratesIoEndpoint {
    base_url: String,
}

impl CratesIoEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

fn crate_request(base_url: &str, identifiers: &[String]) -> Result<SignalRequest, FetchError> {
    let name = identifiers.first().ok_or_else(|| FetchError::InvalidRequest {
        details: "no crate name".to_string(),
    })?;
    checked_package_name(name)?;
    Ok(SignalRequest::get(format!(
        "{}api/v1/crates/{}",
        base_url,
        urlencoding::encode(name)
    )))
}

impl SignalEndpoint for CratesIoEndpoint {
    type Payload = RegistryEntry;

    fn name(&self) -> &'static str {
        "crates_io"
    }

    fn request(&self, identifiers: &[String]) -> Result<SignalRequest, FetchError> {
        crate_request(&self.base_url, identifiers)
    }

    fn parse(&self, _identifiers: &[String], body: &str) -> Result<ParsedChunk<RegistryEntry>, FetchError> {
        let response: CrateResponse = serde_json::from_str(body).map_err(malformed)?;
        let CrateResponse { krate, versions } = response;
        let origin = self.base_url.trim_end_matches('/');

        let entries = versions
            .into_iter()
            .map(|version| RegistryEntry {
                package_name: krate.name.clone(),
                package_version: version.num,
                language: Language::Rust,
                published_at: version.created_at,
                maintainers: version.published_by.map(|publisher| vec![publisher.login]),
                contributors: None,
                tarball: version.dl_path.map(|path| format!("{}{}", origin, path)),
                git_head: None,
                repository_url: krate.repository.clone(),
            })
            .collect();
        Ok(ParsedChunk::found(entries))
    }
}

/// Log-scaled download count in `[0, 1]`.
fn download_scale(downloads: u64, saturation: f64) -> f64 {
    ((downloads as f64 + 1.0).log10() / saturation.log10()).clamp(0.0, 1.0)
}

/// Quality score derived from crates.io download counts.
///
/// crates.io publishes no quality analysis, so popularity comes from lifetime
/// downloads and maintenance from downloads over the last 90 days. The final
/// score is their mean. `quality` stays unset.
pub struct CratesIoQualityEndpoint {
    base_url: String,
}

impl CratesIoQualityEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl SignalEndpoint for CratesIoQualityEndpoint {
    type Payload = QualityScore;

    fn name(&self) -> &'static str {
        "crates_io_quality"
    }

    fn request(&self, identifiers: &[String]) -> Result<SignalRequest, FetchError> {
        crate_request(&self.base_url, identifiers)
    }

    fn parse(&self, _identifiers: &[String], body: &str) -> Result<ParsedChunk<QualityScore>, FetchError> {
        let response: CrateResponse = serde_json::from_str(body).map_err(malformed)?;
        let krate = response.krate;
        let popularity = download_scale(krate.downloads.unwrap_or(0), SATURATED_DOWNLOADS);
        let maintenance = download_scale(
            krate.recent_downloads.unwrap_or(0),
            SATURATED_RECENT_DOWNLOADS,
        );
        Ok(ParsedChunk::found(vec![QualityScore {
            package_name: krate.name,
            package_version: krate.max_version,
            score: (popularity + maintenance) / 2.0,
            quality: None,
            popularity: Some(popularity),
            maintenance: Some(maintenance),
            analyzed_at: krate.updated_at,
        }]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRATE: &str = r#"{
        "crate": {"name": "serde", "repository": "https://github.com/serde-rs/serde"},
        "versions": [
            {
                "num": "1.0.200",
                "created_at": "2024-05-01T12:00:00.000000+00:00",
                "dl_path": "/api/v1/crates/serde/1.0.200/download",
                "published_by": {"login": "dtolnay"}
            },
            {"num": "0.1.0", "created_at": "2015-01-01T00:00:00+00:00", "published_by": null}
        ]
    }"#;

    #[test]
    fn test_request_url() {
        let endpoint = CratesIoEndpoint::new(DEFAULT_CRATES_IO_URL);
        let request = endpoint.request(&["serde_json".to_string()]).unwrap();
        assert_eq!(request.url, "https://crates.io/api/v1/crates/serde_json");
    }

    #[test]
    fn test_parse_versions_as_rust_entries() {
        let endpoint = CratesIoEndpoint::new(DEFAULT_CRATES_IO_URL);
        let parsed = endpoint.parse(&[], CRATE).unwrap();

        assert_eq!(parsed.found.len(), 2);
        let latest = &parsed.found[0];
        assert_eq!(latest.language, Language::Rust);
        assert_eq!(latest.package_version, "1.0.200");
        assert_eq!(latest.maintainers, Some(vec!["dtolnay".to_string()]));
        assert_eq!(
            latest.tarball.as_deref(),
            Some("https://crates.io/api/v1/crates/serde/1.0.200/download")
        );
        assert_eq!(
            latest.repository_url.as_deref(),
            Some("https://github.com/serde-rs/serde")
        );
        assert!(latest.published_at.is_some());

        let oldest = &parsed.found[1];
        assert_eq!(oldest.maintainers, None);
        assert_eq!(oldest.tarball, None);
    }

    #[test]
    fn test_quality_request_shares_the_crate_url() {
        let endpoint = CratesIoQualityEndpoint::new(DEFAULT_CRATES_IO_URL);
        let request = endpoint.request(&["serde".to_string()]).unwrap();
        assert_eq!(request.url, "https://crates.io/api/v1/crates/serde");
    }

    #[test]
    fn test_quality_score_from_download_counts() {
        let endpoint = CratesIoQualityEndpoint::new(DEFAULT_CRATES_IO_URL);
        let body = r#"{
            "crate": {
                "name": "serde",
                "max_version": "1.0.200",
                "downloads": 100000000,
                "recent_downloads": 999,
                "updated_at": "2024-05-01T12:00:00+00:00"
            }
        }"#;
        let parsed = endpoint.parse(&[], body).unwrap();

        let score = &parsed.found[0];
        assert_eq!(score.package_name, "serde");
        assert_eq!(score.package_version.as_deref(), Some("1.0.200"));
        assert!((score.popularity.unwrap() - 1.0).abs() < 1e-9);
        assert!((score.maintenance.unwrap() - 0.5).abs() < 1e-9);
        assert!((score.score - 0.75).abs() < 1e-9);
        assert_eq!(score.quality, None);
        assert!(score.analyzed_at.is_some());
    }

    #[test]
    fn test_unknown_download_counts_score_zero() {
        let endpoint = CratesIoQualityEndpoint::new(DEFAULT_CRATES_IO_URL);
        let parsed = endpoint
            .parse(&[], r#"{"crate":{"name":"fresh"}}"#)
            .unwrap();
        assert_eq!(parsed.found[0].score, 0.0);
    }
}
