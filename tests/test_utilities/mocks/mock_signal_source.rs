use async_trait::async_trait;
use depwatch::prelude::*;
use depwatch::risk_scoring::domain::{BreachRecord, QualityScore, RegistryEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock SignalSource answering from fixed tables; unknown names are misses
#[derive(Default)]
pub struct MockSignalSource {
    pub registry: HashMap<String, Vec<RegistryEntry>>,
    pub quality: HashMap<String, f64>,
    pub registry_calls: AtomicUsize,
    pub quality_calls: AtomicUsize,
    /// Delay before answering quality score lookups
    pub quality_delay: Option<Duration>,
}

impl MockSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(mut self, name: &str, version: &str, published: &str) -> Self {
        let published_at = chrono::DateTime::parse_from_rfc3339(published)
            .unwrap()
            .with_timezone(&chrono::Utc);
        self.registry
            .entry(name.to_string())
            .or_default()
            .push(RegistryEntry {
                package_name: name.to_string(),
                package_version: version.to_string(),
                language: Language::Node,
                published_at: Some(published_at),
                maintainers: Some(vec!["maintainer@example.com".to_string()]),
                contributors: Some(vec![]),
                tarball: None,
                git_head: None,
                repository_url: None,
            });
        self
    }

    pub fn with_quality(mut self, name: &str, score: f64) -> Self {
        self.quality.insert(name.to_string(), score);
        self
    }

    pub fn with_quality_delay(mut self, delay: Duration) -> Self {
        self.quality_delay = Some(delay);
        self
    }
}

#[async_trait]
impl SignalSource for MockSignalSource {
    async fn registry_entries(
        &self,
        names: &[String],
        _language: Language,
    ) -> FetchBatch<RegistryEntry> {
        self.registry_calls.fetch_add(1, Ordering::SeqCst);
        let mut batch = FetchBatch::default();
        for name in names {
            match self.registry.get(name) {
                Some(entries) => batch.found.extend(entries.iter().cloned()),
                None => batch.misses.push(name.clone()),
            }
        }
        batch
    }

    async fn quality_scores(
        &self,
        names: &[String],
        _language: Language,
    ) -> FetchBatch<QualityScore> {
        self.quality_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.quality_delay {
            tokio::time::sleep(delay).await;
        }
        let mut batch = FetchBatch::default();
        for name in names {
            match self.quality.get(name) {
                Some(&score) => batch.found.push(QualityScore {
                    package_name: name.clone(),
                    package_version: None,
                    score,
                    quality: None,
                    popularity: None,
                    maintenance: None,
                    analyzed_at: None,
                }),
                None => batch.misses.push(name.clone()),
            }
        }
        batch
    }

    async fn breaches(&self, accounts: &[String]) -> FetchBatch<BreachRecord> {
        FetchBatch::all_missed(accounts)
    }
}
