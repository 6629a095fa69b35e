use super::signal_fetcher::{checked_package_name, encode_package_name, malformed, ParsedChunk, SignalEndpoint};
use crate::ports::outbound::SignalRequest;
use crate::risk_scoring::domain::{Language, RegistryEntry};
use crate::shared::error::FetchError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_NPM_REGISTRY_URL: &str = "https://registry.npmjs.org/";

#[derive(Debug, Deserialize)]
struct Packument {
    name: String,
    #[serde(default)]
    time: BTreeMap<String, String>,
    #[serde(default)]
    maintainers: Option<Vec<Person>>,
    #[serde(default)]
    versions: BTreeMap<String, VersionManifest>,
}

#[derive(Debug, Deserialize)]
struct VersionManifest {
    #[serde(default)]
    maintainers: Option<Vec<Person>>,
    #[serde(default)]
    contributors: Option<Vec<Person>>,
    #[serde(default)]
    dist: Option<Dist>,
    #[serde(default, rename = "gitHead")]
    git_head: Option<String>,
    #[serde(default)]
    repository: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Dist {
    #[serde(default)]
    tarball: Option<String>,
}

/// A maintainer or contributor; the registry uses both
/// `{"name": ..}` objects and `"Name <email> (url)"` strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Person {
    Object {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
    },
    Text(String),
}

impl Person {
    fn display_name(&self) -> Option<String> {
        let name = match self {
            Person::Object { name, email } => name.clone().or_else(|| email.clone())?,
            Person::Text(text) => text
                .split(['<', '('])
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
        };
        (!name.is_empty()).then_some(name)
    }

    /// Email when the registry gives one, else the display name.
    fn account(&self) -> Option<String> {
        let email = match self {
            Person::Object { email, .. } => email.clone(),
            Person::Text(text) => text
                .split_once('<')
                .and_then(|(_, rest)| rest.split_once('>'))
                .map(|(email, _)| email.to_string()),
        };
        email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty())
            .or_else(|| self.display_name())
    }
}

fn names(people: Option<Vec<Person>>) -> Option<Vec<String>> {
    people.map(|people| people.iter().filter_map(Person::display_name).collect())
}

fn accounts(people: Option<Vec<Person>>) -> Option<Vec<String>> {
    people.map(|people| people.iter().filter_map(Person::account).collect())
}

fn repository_url(repository: Option<Value>) -> Option<String> {
    match repository? {
        Value::String(url) => Some(url),
        Value::Object(fields) => fields.get("url")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// npm registry packument endpoint, one request per package.
pub struct NpmRegistryEndpoint {
    base_url: String,
}

impl NpmRegistryEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn entries(packument: Packument) -> Vec<RegistryEntry> {
        let Packument {
            name,
            time,
            maintainers: package_maintainers,
            versions,
        } = packument;
        let package_maintainers = accounts(package_maintainers);

        versions
            .into_iter()
            .map(|(version, manifest)| {
                let published_at = time
                    .get(&version)
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|ts| ts.with_timezone(&Utc));
                RegistryEntry {
                    package_name: name.clone(),
                    package_version: version,
                    language: Language::Node,
                    published_at,
                    maintainers: accounts(manifest.maintainers)
                        .or_else(|| package_maintainers.clone()),
                    contributors: names(manifest.contributors),
                    tarball: manifest.dist.and_then(|dist| dist.tarball),
                    git_head: manifest.git_head,
                    repository_url: repository_url(manifest.repository),
                }
            })
            .collect()
    }
}

impl SignalEndpoint for NpmRegistryEndpoint {
    type Payload = RegistryEntry;

    fn name(&self) -> &'static str {
        "npm_registry"
    }

    fn request(&self, identifiers: &[String]) -> Result<SignalRequest, FetchError> {
        let name = identifiers.first().ok_or_else(|| FetchError::InvalidRequest {
            details: "no package name".to_string(),
        })?;
        checked_package_name(name)?;
        Ok(SignalRequest::get(format!(
            "{}{}",
            self.base_url,
            encode_package_name(name)
        )))
    }

    fn parse(&self, _identifiers: &[String], body: &str) -> Result<ParsedChunk<RegistryEntry>, FetchError> {
        let packument: Packument = serde_json::from_str(body).map_err(malformed)?;
        Ok(ParsedChunk::found(Self::entries(packument)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKUMENT: &str = r#"{
        "name": "@hapi/bounce",
        "time": {
            "created": "2019-01-01T00:00:00.000Z",
            "1.0.0": "2019-01-02T10:00:00.000Z",
            "2.0.0": "2020-06-01T12:30:00.000Z"
        },
        "maintainers": [{"name": "hueniverse", "email": "eran@example.com"}],
        "versions": {
            "1.0.0": {
                "dist": {"tarball": "https://registry.npmjs.org/@hapi/bounce/-/bounce-1.0.0.tgz"},
                "gitHead": "abc123",
                "repository": "git://github.com/hapijs/bounce.git"
            },
            "2.0.0": {
                "maintainers": [{"name": "hueniverse"}, {"name": "devinivy"}],
                "contributors": ["Jane Doe <jane@example.com> (https://jane.example)", {"email": "x@example.com"}],
                "repository": {"type": "git", "url": "https://github.com/hapijs/bounce"}
            }
        }
    }"#;

    fn endpoint() -> NpmRegistryEndpoint {
        NpmRegistryEndpoint::new(DEFAULT_NPM_REGISTRY_URL)
    }

    #[test]
    fn test_request_encodes_scoped_name() {
        let request = endpoint().request(&["@hapi/bounce".to_string()]).unwrap();
        assert_eq!(request.url, "https://registry.npmjs.org/@hapi%2Fbounce");
    }

    #[test]
    fn test_request_rejects_unsafe_name() {
        let err = endpoint().request(&["a/../b".to_string()]).unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest { .. }));
    }

    #[test]
    fn test_one_entry_per_published_version() {
        let parsed = endpoint().parse(&[], PACKUMENT).unwrap();
        assert_eq!(parsed.found.len(), 2);

        let first = &parsed.found[0];
        assert_eq!(first.package_name, "@hapi/bounce");
        assert_eq!(first.package_version, "1.0.0");
        assert_eq!(first.language, Language::Node);
        assert_eq!(
            first.published_at.unwrap().to_rfc3339(),
            "2019-01-02T10:00:00+00:00"
        );
        // falls back to package-level maintainers, keeping the email
        assert_eq!(first.maintainers, Some(vec!["eran@example.com".to_string()]));
        assert_eq!(first.contributors, None);
        assert_eq!(first.git_head.as_deref(), Some("abc123"));
        assert!(first.tarball.as_deref().unwrap().ends_with("bounce-1.0.0.tgz"));
        assert_eq!(
            first.repository_url.as_deref(),
            Some("git://github.com/hapijs/bounce.git")
        );

        let second = &parsed.found[1];
        assert_eq!(second.author_count(), 2);
        assert_eq!(
            second.maintainers,
            Some(vec!["hueniverse".to_string(), "devinivy".to_string()])
        );
        assert_eq!(
            second.contributors,
            Some(vec!["Jane Doe".to_string(), "x@example.com".to_string()])
        );
        assert_eq!(
            second.repository_url.as_deref(),
            Some("https://github.com/hapijs/bounce")
        );
    }

    #[test]
    fn test_malformed_body_is_retryable() {
        let err = endpoint().parse(&[], "<html>").unwrap_err();
        assert!(matches!(err, FetchError::Malformed { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_maintainer_accounts_prefer_emails() {
        let body = r#"{
            "name": "left-pad",
            "versions": {"1.3.0": {"maintainers": [
                {"name": "stevemao", "email": "maochenyan@example.com"},
                "Cameron Westland <camwest@example.com>",
                "azer"
            ]}}
        }"#;
        let parsed = endpoint().parse(&[], body).unwrap();
        assert_eq!(
            parsed.found[0].maintainers,
            Some(vec![
                "maochenyan@example.com".to_string(),
                "camwest@example.com".to_string(),
                "azer".to_string(),
            ])
        );
    }
}
