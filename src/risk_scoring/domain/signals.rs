use super::package_version::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry metadata for one published version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub package_name: String,
    pub package_version: String,
    pub language: Language,
    pub published_at: Option<DateTime<Utc>>,
    /// `None` when the registry did not list maintainers at all
    pub maintainers: Option<Vec<String>>,
    pub contributors: Option<Vec<String>>,
    pub tarball: Option<String>,
    pub git_head: Option<String>,
    pub repository_url: Option<String>,
}

impl RegistryEntry {
    pub fn author_count(&self) -> u32 {
        self.maintainers.as_ref().map_or(0, |m| m.len() as u32)
    }

    pub fn contributor_count(&self) -> u32 {
        self.contributors.as_ref().map_or(0, |c| c.len() as u32)
    }
}

/// Upstream quality/popularity score for a package.
///
/// Scores are computed per package upstream, against whichever version was
/// current at analysis time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub package_name: String,
    pub package_version: Option<String>,
    /// Final score in `[0, 1]`
    pub score: f64,
    pub quality: Option<f64>,
    pub popularity: Option<f64>,
    pub maintenance: Option<f64>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Public breaches an account identifier appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachRecord {
    pub account: String,
    pub breach_names: Vec<String>,
}

/// One vulnerable range of a package, as published by an advisory feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedAdvisory {
    pub language: Language,
    /// Upstream advisory id, e.g. `GHSA-xxxx-xxxx-xxxx`
    pub advisory_id: String,
    pub package_name: String,
    pub severity: Option<String>,
    pub summary: Option<String>,
    pub permalink: Option<String>,
    /// Comparator list such as `>= 1.0.0, < 1.2.3`
    pub vulnerable_range: Option<String>,
    pub first_patched_version: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl FeedAdvisory {
    /// Advisory URL when the feed gives one, else the upstream id.
    pub fn source_id(&self) -> &str {
        self.permalink.as_deref().unwrap_or(&self.advisory_id)
    }
}
