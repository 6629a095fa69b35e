use crate::risk_scoring::domain::{Language, QualityScore, RegistryEntry};
use crate::shared::Result;

/// SignalRepository port for third-party metadata backing the scores
pub trait SignalRepository: Send + Sync {
    /// Stores registry entries, replacing any entry for the same
    /// (name, version, language). Returns the number stored.
    fn save_registry_entries(&self, entries: Vec<RegistryEntry>) -> Result<usize>;

    fn registry_entry(
        &self,
        name: &str,
        version: &str,
        language: Language,
    ) -> Result<Option<RegistryEntry>>;

    /// Every stored version of a package.
    fn registry_entries_for(&self, name: &str, language: Language) -> Result<Vec<RegistryEntry>>;

    /// Stores quality scores. Returns the number stored.
    fn save_quality_scores(&self, scores: Vec<QualityScore>) -> Result<usize>;

    /// Score for `name` at `version`, falling back to the most recently
    /// stored score for the package.
    fn quality_score(&self, name: &str, version: &str) -> Result<Option<QualityScore>>;

    /// Distinct names of known package versions with no registry entry.
    fn package_names_missing_registry_entries(&self, language: Language) -> Result<Vec<String>>;

    /// Distinct names of known package versions with no quality score.
    fn package_names_missing_quality_scores(&self, language: Language) -> Result<Vec<String>>;
}
