use crate::risk_scoring::domain::{
    BreachRecord, FeedAdvisory, Language, QualityScore, RegistryEntry,
};
use crate::shared::error::FetchError;
use async_trait::async_trait;

/// Outcome of fetching signals for a set of identifiers.
///
/// Misses and failures are values; one bad identifier never aborts the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchBatch<T> {
    pub found: Vec<T>,
    /// Identifiers upstream reported as not found
    pub misses: Vec<String>,
    /// Identifiers whose fetch still failed after retries
    pub failures: Vec<(String, FetchError)>,
}

impl<T> Default for FetchBatch<T> {
    fn default() -> Self {
        Self {
            found: Vec::new(),
            misses: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> FetchBatch<T> {
    /// Every identifier counted as a miss; used for unsupported ecosystems.
    pub fn all_missed(identifiers: &[String]) -> Self {
        Self {
            found: Vec::new(),
            misses: identifiers.to_vec(),
            failures: Vec::new(),
        }
    }
}

/// SignalSource port for third-party package metadata
///
/// Implementations bound concurrency, retry transient failures and report
/// not-found identifiers as misses.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Registry metadata for every published version of each package.
    async fn registry_entries(
        &self,
        names: &[String],
        language: Language,
    ) -> FetchBatch<RegistryEntry>;

    /// Upstream quality scores, one per package.
    async fn quality_scores(&self, names: &[String], language: Language)
        -> FetchBatch<QualityScore>;

    /// Public breaches for each account identifier.
    async fn breaches(&self, accounts: &[String]) -> FetchBatch<BreachRecord>;

    /// Published advisories for each package, every page followed.
    ///
    /// Sources without an advisory feed find nothing.
    async fn advisories(&self, names: &[String], language: Language) -> FetchBatch<FeedAdvisory> {
        let _ = (names, language);
        FetchBatch::default()
    }
}
