use super::signal_fetcher::{checked_package_name, malformed, Page, PagedSignalEndpoint};
use crate::ports::outbound::SignalRequest;
use crate::risk_scoring::domain::{FeedAdvisory, Language};
use crate::shared::error::FetchError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// GitHub caps `first` at 100 nodes per page
pub const MAX_GITHUB_PAGE_SIZE: usize = 100;

const VULNERABILITIES_QUERY: &str = r#"
query($ecosystem: SecurityAdvisoryEcosystem!, $package: String!, $first: Int!, $after: String) {
  securityVulnerabilities(ecosystem: $ecosystem, package: $package, first: $first, after: $after,
                          orderBy: {field: UPDATED_AT, direction: DESC}) {
    nodes {
      advisory { ghsaId permalink publishedAt updatedAt withdrawnAt severity summary }
      package { name }
      vulnerableVersionRange
      firstPatchedVersion { identifier }
    }
    pageInfo { endCursor hasNextPage }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<VulnerabilityData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VulnerabilityData {
    security_vulnerabilities: VulnerabilityConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VulnerabilityConnection {
    #[serde(default)]
    nodes: Vec<VulnerabilityNode>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VulnerabilityNode {
    advisory: GithubAdvisory,
    package: GithubPackage,
    vulnerable_version_range: Option<String>,
    first_patched_version: Option<PatchedVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GithubAdvisory {
    ghsa_id: String,
    permalink: Option<String>,
    published_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    withdrawn_at: Option<DateTime<Utc>>,
    severity: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubPackage {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PatchedVersion {
    identifier: String,
}

/// GitHub security advisory feed for one ecosystem.
///
/// Queries `securityVulnerabilities` per package, one GraphQL POST per page.
/// Withdrawn advisories are dropped.
pub struct GithubAdvisoryEndpoint {
    url: String,
    auth_token: Option<String>,
    language: Language,
    page_size: usize,
}

impl GithubAdvisoryEndpoint {
    pub fn new(
        url: impl Into<String>,
        auth_token: Option<String>,
        language: Language,
        page_size: usize,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            auth_token,
            language,
            page_size: page_size.clamp(1, MAX_GITHUB_PAGE_SIZE),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// The feed needs a token; unauthenticated GraphQL calls are refused.
    pub fn is_enabled(&self) -> bool {
        self.auth_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    fn ecosystem(&self) -> &'static str {
        match self.language {
            Language::Node => "NPM",
            Language::Rust => "RUST",
            Language::Python => "PIP",
        }
    }
}

impl PagedSignalEndpoint for GithubAdvisoryEndpoint {
    type Payload = FeedAdvisory;

    fn name(&self) -> &'static str {
        "github_advisories"
    }

    fn page_request(
        &self,
        identifier: &str,
        cursor: Option<&str>,
    ) -> Result<SignalRequest, FetchError> {
        checked_package_name(identifier)?;
        let body = json!({
            "query": VULNERABILITIES_QUERY,
            "variables": {
                "ecosystem": self.ecosystem(),
                "package": identifier,
                "first": self.page_size,
                "after": cursor,
            }
        });
        Ok(SignalRequest::post_json(self.url.clone(), body).with_auth_token(self.auth_token.clone()))
    }

    fn parse_page(&self, _identifier: &str, body: &str) -> Result<Page<FeedAdvisory>, FetchError> {
        let response: GraphqlResponse = serde_json::from_str(body).map_err(malformed)?;
        let data = match response.data {
            Some(data) => data,
            None => {
                let messages: Vec<String> =
                    response.errors.into_iter().map(|e| e.message).collect();
                return Err(FetchError::InvalidRequest {
                    details: format!("graphql errors: {}", messages.join("; ")),
                });
            }
        };
        let connection = data.security_vulnerabilities;

        let found = connection
            .nodes
            .into_iter()
            .filter(|node| node.advisory.withdrawn_at.is_none())
            .map(|node| FeedAdvisory {
                language: self.language,
                advisory_id: node.advisory.ghsa_id,
                package_name: node.package.name,
                severity: node.advisory.severity,
                summary: node.advisory.summary,
                permalink: node.advisory.permalink,
                vulnerable_range: node.vulnerable_version_range,
                first_patched_version: node.first_patched_version.map(|v| v.identifier),
                published_at: node.advisory.published_at,
                updated_at: node.advisory.updated_at,
            })
            .collect();
        let next_cursor = if connection.page_info.has_next_page {
            connection.page_info.end_cursor
        } else {
            None
        };
        Ok(Page { found, next_cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::outbound::HttpMethod;

    const PAGE: &str = r#"{
        "data": {"securityVulnerabilities": {
            "nodes": [
                {
                    "advisory": {
                        "ghsaId": "GHSA-p6mc-m468-83gw",
                        "permalink": "https://github.com/advisories/GHSA-p6mc-m468-83gw",
                        "publishedAt": "2020-07-15T19:15:48Z",
                        "updatedAt": "2021-05-06T16:05:51Z",
                        "withdrawnAt": null,
                        "severity": "HIGH",
                        "summary": "Prototype Pollution in lodash"
                    },
                    "package": {"name": "lodash"},
                    "vulnerableVersionRange": ">= 3.7.0, < 4.17.19",
                    "firstPatchedVersion": {"identifier": "4.17.19"}
                },
                {
                    "advisory": {
                        "ghsaId": "GHSA-xxxx-withdrawn",
                        "permalink": null,
                        "publishedAt": null,
                        "updatedAt": null,
                        "withdrawnAt": "2021-01-01T00:00:00Z",
                        "severity": "LOW",
                        "summary": "Withdrawn"
                    },
                    "package": {"name": "lodash"},
                    "vulnerableVersionRange": "< 1.0.0",
                    "firstPatchedVersion": null
                }
            ],
            "pageInfo": {"endCursor": "Y3Vyc29yOjI=", "hasNextPage": true}
        }}
    }"#;

    fn endpoint() -> GithubAdvisoryEndpoint {
        GithubAdvisoryEndpoint::new(
            format!("{}/", DEFAULT_GITHUB_GRAPHQL_URL),
            Some("ghp_token".to_string()),
            Language::Node,
            100,
        )
    }

    #[test]
    fn test_page_request_posts_variables_with_token() {
        let request = endpoint().page_request("lodash", Some("abc")).unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://api.github.com/graphql");
        assert_eq!(request.auth_token.as_deref(), Some("ghp_token"));
        let variables = &request.body.unwrap()["variables"];
        assert_eq!(variables["ecosystem"], "NPM");
        assert_eq!(variables["package"], "lodash");
        assert_eq!(variables["first"], 100);
        assert_eq!(variables["after"], "abc");
    }

    #[test]
    fn test_first_page_has_null_cursor_and_ecosystem_follows_language() {
        let endpoint = GithubAdvisoryEndpoint::new(DEFAULT_GITHUB_GRAPHQL_URL, None, Language::Rust, 500);
        let request = endpoint.page_request("smallvec", None).unwrap();
        let variables = &request.body.unwrap()["variables"];

        assert!(variables["after"].is_null());
        assert_eq!(variables["ecosystem"], "RUST");
        assert_eq!(variables["first"], 100);
        assert!(!endpoint.is_enabled());
    }

    #[test]
    fn test_unsafe_package_name_is_rejected() {
        assert!(endpoint().page_request("../x", None).is_err());
    }

    #[test]
    fn test_parse_page_skips_withdrawn_and_keeps_cursor() {
        let page = endpoint().parse_page("lodash", PAGE).unwrap();

        assert_eq!(page.next_cursor.as_deref(), Some("Y3Vyc29yOjI="));
        assert_eq!(page.found.len(), 1);
        let advisory = &page.found[0];
        assert_eq!(advisory.advisory_id, "GHSA-p6mc-m468-83gw");
        assert_eq!(advisory.language, Language::Node);
        assert_eq!(advisory.severity.as_deref(), Some("HIGH"));
        assert_eq!(advisory.vulnerable_range.as_deref(), Some(">= 3.7.0, < 4.17.19"));
        assert_eq!(advisory.first_patched_version.as_deref(), Some("4.17.19"));
        assert!(advisory.published_at.is_some());
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let body = r#"{"data":{"securityVulnerabilities":{"nodes":[],
            "pageInfo":{"endCursor":"Zm9v","hasNextPage":false}}}}"#;
        let page = endpoint().parse_page("lodash", body).unwrap();
        assert!(page.found.is_empty());
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_graphql_errors_are_not_retried() {
        let body = r#"{"data":null,"errors":[{"message":"Bad credentials"}]}"#;
        let err = endpoint().parse_page("lodash", body).unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest { .. }));
        assert!(!err.is_retryable());
    }
}
