use super::ids::{AdvisoryId, PackageVersionId};
use super::package_version::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Severity bucket used for vulnerability counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Maps an upstream severity label to a bucket.
    ///
    /// `moderate` is npm's name for `medium`. Anything else (`info`, `none`,
    /// typos) has no bucket and returns `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" | "moderate" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural key of an advisory: the upstream source id within one ecosystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdvisoryKey {
    pub language: Language,
    /// Advisory URL, or the upstream advisory id when no URL is given
    pub source_id: String,
}

/// Correctable advisory fields, overwritten on every re-ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryFields {
    pub package_name: String,
    /// Raw upstream label, kept even when it maps to no bucket
    pub severity: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub cwe: Option<u32>,
    pub cves: Vec<String>,
    pub vulnerable_versions: Option<String>,
    pub patched_versions: Option<String>,
    pub exploitability: Option<i32>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// A vulnerability record linked to the package versions it affects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: AdvisoryId,
    pub key: AdvisoryKey,
    pub fields: AdvisoryFields,
    pub impacted_version_ids: BTreeSet<PackageVersionId>,
}

impl Advisory {
    pub fn severity(&self) -> Option<Severity> {
        self.fields.severity.as_deref().and_then(Severity::parse)
    }

    /// Applies a re-ingested copy of this advisory.
    ///
    /// Fields are replaced; the impacted set is unioned so it never shrinks.
    pub fn merge(&mut self, fields: AdvisoryFields, impacted: &BTreeSet<PackageVersionId>) {
        self.fields = fields;
        self.impacted_version_ids.extend(impacted.iter().copied());
    }

    pub fn impacts(&self, id: PackageVersionId) -> bool {
        self.impacted_version_ids.contains(&id)
    }
}

/// Parses a `CWE-79` style identifier into its number.
pub fn parse_cwe(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("CWE-")
        .or_else(|| trimmed.strip_prefix("cwe-"))
        .unwrap_or(trimmed);
    digits.parse().ok()
}

/// Whether `version` falls inside a vulnerable `range`.
///
/// Ranges are `||`-separated alternatives of comma-separated comparators
/// (`=`, `<`, `<=`, `>`, `>=`), e.g. `>= 1.0.0, < 1.2.3 || = 2.0.0`. A bare
/// version means `=`. Returns `None` when the range or version does not
/// parse.
pub fn version_in_range(version: &str, range: &str) -> Option<bool> {
    let version = DottedVersion::parse(version)?;
    let mut matched = false;
    for alternative in range.split("||") {
        let mut all = true;
        for comparator in alternative.split(',') {
            let comparator = comparator.trim();
            if comparator.is_empty() {
                return None;
            }
            let (op, bound) = split_comparator(comparator);
            let bound = DottedVersion::parse(bound)?;
            let ordering = version.cmp(&bound);
            all &= match op {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                ">=" => ordering.is_ge(),
                _ => ordering.is_eq(),
            };
        }
        matched |= all;
    }
    Some(matched)
}

fn split_comparator(comparator: &str) -> (&str, &str) {
    for op in ["<=", ">=", "<", ">", "="] {
        if let Some(rest) = comparator.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("=", comparator)
}

/// Numeric release parts plus an optional pre-release tag.
///
/// A pre-release sorts before the release it precedes; pre-release tags
/// compare as plain strings.
#[derive(Debug)]
struct DottedVersion {
    release: Vec<u64>,
    pre: Option<String>,
}

impl DottedVersion {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let raw = raw.strip_prefix('v').unwrap_or(raw);
        let raw = raw.split('+').next()?;
        let (release, pre) = match raw.split_once('-') {
            Some((release, pre)) => (release, Some(pre.to_string())),
            None => (raw, None),
        };
        let release = release
            .split('.')
            .map(|part| part.parse().ok())
            .collect::<Option<Vec<u64>>>()?;
        if release.is_empty() {
            return None;
        }
        Some(Self { release, pre })
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let width = self.release.len().max(other.release.len());
        let part = |v: &Self, i: usize| v.release.get(i).copied().unwrap_or(0);
        (0..width)
            .map(|i| part(self, i).cmp(&part(other, i)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| match (&self.pre, &other.pre) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for DottedVersion {}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advisory(impacted: &[u64]) -> Advisory {
        Advisory {
            id: AdvisoryId(1),
            key: AdvisoryKey {
                language: Language::Node,
                source_id: "https://npmjs.com/advisories/1500".to_string(),
            },
            fields: AdvisoryFields {
                package_name: "yargs-parser".to_string(),
                severity: Some("low".to_string()),
                ..AdvisoryFields::default()
            },
            impacted_version_ids: impacted.iter().copied().map(PackageVersionId).collect(),
        }
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::parse("critical"), Some(Severity::Critical));
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(Severity::parse("moderate"), Some(Severity::Medium));
        assert_eq!(Severity::parse(" medium "), Some(Severity::Medium));
        assert_eq!(Severity::parse("low"), Some(Severity::Low));
    }

    #[test]
    fn test_unrecognized_severity_has_no_bucket() {
        assert_eq!(Severity::parse("info"), None);
        assert_eq!(Severity::parse("severe"), None);
        assert_eq!(Severity::parse(""), None);
    }

    #[test]
    fn test_merge_never_shrinks_impacted_set() {
        let mut existing = advisory(&[1, 2]);
        let fields = AdvisoryFields {
            package_name: "yargs-parser".to_string(),
            severity: Some("moderate".to_string()),
            ..AdvisoryFields::default()
        };

        existing.merge(fields, &[PackageVersionId(3)].into_iter().collect());

        assert_eq!(existing.impacted_version_ids.len(), 3);
        assert!(existing.impacts(PackageVersionId(1)));
        assert!(existing.impacts(PackageVersionId(3)));
        assert_eq!(existing.severity(), Some(Severity::Medium));
    }

    #[test]
    fn test_merge_with_empty_set_keeps_ids() {
        let mut existing = advisory(&[5]);
        existing.merge(existing.fields.clone(), &BTreeSet::new());
        assert!(existing.impacts(PackageVersionId(5)));
    }

    #[test]
    fn test_version_in_range() {
        assert_eq!(version_in_range("4.17.15", "< 4.17.19"), Some(true));
        assert_eq!(version_in_range("4.17.19", "< 4.17.19"), Some(false));
        assert_eq!(version_in_range("1.1.0", ">= 1.0.0, < 1.2.3"), Some(true));
        assert_eq!(version_in_range("0.9.9", ">= 1.0.0, < 1.2.3"), Some(false));
        assert_eq!(version_in_range("2.0.0", ">= 1.0.0, < 1.2.3 || = 2.0.0"), Some(true));
        assert_eq!(version_in_range("1.2", "<= 1.2.0"), Some(true));
        assert_eq!(version_in_range("v3.0.0", "3.0.0"), Some(true));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert_eq!(version_in_range("2.0.0-beta.1", "< 2.0.0"), Some(true));
        assert_eq!(version_in_range("2.0.0-beta.1", ">= 2.0.0"), Some(false));
    }

    #[test]
    fn test_unparsable_range_is_unknown() {
        assert_eq!(version_in_range("1.0.0", "~> 1.0"), None);
        assert_eq!(version_in_range("latest", "< 1.0.0"), None);
        assert_eq!(version_in_range("1.0.0", ">= 1.0.0,"), None);
    }

    #[test]
    fn test_parse_cwe() {
        assert_eq!(parse_cwe("CWE-471"), Some(471));
        assert_eq!(parse_cwe("79"), Some(79));
        assert_eq!(parse_cwe("CWE-unknown"), None);
    }
}
