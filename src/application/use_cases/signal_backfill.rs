use crate::application::dto::BackfillSummary;
use crate::ports::outbound::{
    AdvisoryRepository, FetchBatch, PackageGraphRepository, SignalRepository, SignalSource,
};
use crate::risk_scoring::domain::{
    version_in_range, AdvisoryFields, AdvisoryKey, BreachRecord, FeedAdvisory, Language,
    PackageVersion, PackageVersionId,
};
use crate::shared::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// SignalBackfill - fetches third-party signals the store is missing
///
/// Registry metadata, quality scores and advisory feeds are fetched
/// concurrently. Misses and failures are logged and counted; they never
/// fail the caller.
pub struct SignalBackfill<S, F: ?Sized> {
    store: Arc<S>,
    source: Arc<F>,
}

impl<S, F> SignalBackfill<S, F>
where
    S: SignalRepository + AdvisoryRepository + PackageGraphRepository,
    F: SignalSource + ?Sized,
{
    pub fn new(store: Arc<S>, source: Arc<F>) -> Self {
        Self { store, source }
    }

    #[instrument(skip(self))]
    pub async fn backfill(&self, language: Language) -> Result<BackfillSummary> {
        let registry_names = self.store.package_names_missing_registry_entries(language)?;
        let quality_names = self.store.package_names_missing_quality_scores(language)?;
        let known = self.store.package_versions_in(language)?;
        if registry_names.is_empty() && quality_names.is_empty() && known.is_empty() {
            return Ok(BackfillSummary::default());
        }
        let known_names: Vec<String> = known
            .iter()
            .map(|version| version.name().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (registry, quality, feed) = tokio::join!(
            self.source.registry_entries(&registry_names, language),
            self.source.quality_scores(&quality_names, language),
            self.source.advisories(&known_names, language),
        );

        let mut summary = BackfillSummary::default();
        Self::tally("registry", &registry, &mut summary);
        Self::tally("quality score", &quality, &mut summary);
        // a package absent from the feed simply has no advisories
        summary.failures += feed.failures.len();
        for (identifier, error) in &feed.failures {
            warn!(endpoint = "advisory feed", %identifier, %error, "signal fetch failed after retries");
        }

        summary.registry_entries = self.store.save_registry_entries(registry.found)?;
        summary.quality_scores = self.store.save_quality_scores(quality.found)?;
        summary.advisories = self.save_feed_advisories(language, feed.found, &known)?;

        info!(
            registry_entries = summary.registry_entries,
            quality_scores = summary.quality_scores,
            advisories = summary.advisories,
            misses = summary.misses,
            failures = summary.failures,
            "signal backfill finished"
        );
        Ok(summary)
    }

    /// Looks up public breaches for maintainer accounts.
    ///
    /// Only accounts that look like email addresses are queried.
    #[instrument(skip_all, fields(accounts = accounts.len()))]
    pub async fn breaches(&self, accounts: &[String]) -> Vec<BreachRecord> {
        let emails: Vec<String> = accounts
            .iter()
            .filter(|account| account.contains('@') && !account.starts_with('@'))
            .cloned()
            .collect();
        if emails.is_empty() {
            return Vec::new();
        }
        let batch = self.source.breaches(&emails).await;
        let mut summary = BackfillSummary::default();
        Self::tally("breach", &batch, &mut summary);
        batch.found
    }

    /// Upserts feed advisories, linking each to the known versions its
    /// ranges cover.
    ///
    /// Rows sharing a source id are one advisory; their ranges are joined
    /// with `||`. Versions whose range does not parse are left unlinked.
    fn save_feed_advisories(
        &self,
        language: Language,
        feed: Vec<FeedAdvisory>,
        known: &[PackageVersion],
    ) -> Result<usize> {
        let mut grouped: BTreeMap<String, Vec<FeedAdvisory>> = BTreeMap::new();
        for advisory in feed {
            grouped
                .entry(advisory.source_id().to_string())
                .or_default()
                .push(advisory);
        }

        for (source_id, rows) in &grouped {
            let mut impacted: BTreeSet<PackageVersionId> = BTreeSet::new();
            for row in rows {
                let Some(range) = row.vulnerable_range.as_deref() else {
                    continue;
                };
                for version in known.iter().filter(|v| v.name() == row.package_name) {
                    match version_in_range(version.version(), range) {
                        Some(true) => {
                            impacted.insert(version.id);
                        }
                        Some(false) => {}
                        None => debug!(
                            %source_id,
                            version = version.version(),
                            range,
                            "unparsable version range; not linking"
                        ),
                    }
                }
            }
            let key = AdvisoryKey {
                language,
                source_id: source_id.clone(),
            };
            self.store
                .upsert_advisory(key, feed_fields(rows), &impacted)?;
        }
        Ok(grouped.len())
    }

    /// Breaches for the maintainers of one published package version.
    ///
    /// `version` defaults to the most recently published one. Fails when the
    /// registry does not know the package or the version.
    #[instrument(skip(self))]
    pub async fn maintainer_breaches(
        &self,
        name: &str,
        version: Option<&str>,
        language: Language,
    ) -> Result<Vec<BreachRecord>> {
        let names = [name.to_string()];
        let batch = self.source.registry_entries(&names, language).await;
        if let Some((_, error)) = batch.failures.first() {
            anyhow::bail!("registry lookup for {} failed: {}", name, error);
        }
        let entry = match version {
            Some(version) => batch
                .found
                .iter()
                .find(|entry| entry.package_version == version),
            None => batch.found.iter().max_by_key(|entry| entry.published_at),
        }
        .cloned()
        .ok_or_else(|| match version {
            Some(version) => anyhow::anyhow!("{}@{} is not published to the registry", name, version),
            None => anyhow::anyhow!("{} is not published to the registry", name),
        })?;
        self.store.save_registry_entries(batch.found)?;

        let maintainers = entry.maintainers.unwrap_or_default();
        debug!(
            package = name,
            version = %entry.package_version,
            maintainers = maintainers.len(),
            "checking maintainer accounts"
        );
        Ok(self.breaches(&maintainers).await)
    }

    fn tally<T>(endpoint: &str, batch: &FetchBatch<T>, summary: &mut BackfillSummary) {
        summary.misses += batch.misses.len();
        summary.failures += batch.failures.len();
        if !batch.misses.is_empty() {
            info!(endpoint, misses = batch.misses.len(), "identifiers not found upstream");
        }
        for (identifier, error) in &batch.failures {
            warn!(endpoint, %identifier, %error, "signal fetch failed after retries");
        }
    }
}

/// Advisory fields for one feed advisory; `rows` is never empty.
fn feed_fields(rows: &[FeedAdvisory]) -> AdvisoryFields {
    let joined = |values: Vec<String>| (!values.is_empty()).then(|| values.join(" || "));
    let first = &rows[0];
    AdvisoryFields {
        package_name: first.package_name.clone(),
        severity: first.severity.clone(),
        title: first.summary.clone(),
        url: first.permalink.clone(),
        vulnerable_versions: joined(
            rows.iter()
                .filter_map(|row| row.vulnerable_range.clone())
                .collect(),
        ),
        patched_versions: joined(
            rows.iter()
                .filter_map(|row| row.first_patched_version.as_ref())
                .map(|patched| format!(">= {}", patched))
                .collect(),
        ),
        created: first.published_at,
        updated: rows.iter().filter_map(|row| row.updated_at).max(),
        ..AdvisoryFields::default()
    }
}
