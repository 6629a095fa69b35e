use super::crates_io::{CratesIoEndpoint, CratesIoQualityEndpoint};
use super::github_advisories::GithubAdvisoryEndpoint;
use super::hibp::HibpEndpoint;
use super::npm_registry::NpmRegistryEndpoint;
use super::npms_io::NpmsIoEndpoint;
use super::signal_fetcher::SignalFetcher;
use crate::ports::outbound::{FetchBatch, SignalSource};
use crate::risk_scoring::domain::{
    BreachRecord, FeedAdvisory, Language, QualityScore, RegistryEntry,
};
use async_trait::async_trait;
use tracing::debug;

/// HttpSignalSource adapter routing signal lookups to per-endpoint fetchers
///
/// Node packages resolve through the npm registry and npms.io, Rust crates
/// through crates.io. Ecosystems without an endpoint report every
/// identifier as a miss. Advisory feeds are opt-in per ecosystem.
pub struct HttpSignalSource {
    npm_registry: SignalFetcher<NpmRegistryEndpoint>,
    npms_io: SignalFetcher<NpmsIoEndpoint>,
    hibp: SignalFetcher<HibpEndpoint>,
    crates_io: SignalFetcher<CratesIoEndpoint>,
    crates_io_quality: SignalFetcher<CratesIoQualityEndpoint>,
    advisory_feeds: Vec<SignalFetcher<GithubAdvisoryEndpoint>>,
}

impl HttpSignalSource {
    pub fn new(
        npm_registry: SignalFetcher<NpmRegistryEndpoint>,
        npms_io: SignalFetcher<NpmsIoEndpoint>,
        hibp: SignalFetcher<HibpEndpoint>,
        crates_io: SignalFetcher<CratesIoEndpoint>,
        crates_io_quality: SignalFetcher<CratesIoQualityEndpoint>,
    ) -> Self {
        Self {
            npm_registry,
            npms_io,
            hibp,
            crates_io,
            crates_io_quality,
            advisory_feeds: Vec::new(),
        }
    }

    /// Adds an advisory feed; feeds without a token are ignored.
    pub fn with_advisory_feed(mut self, feed: SignalFetcher<GithubAdvisoryEndpoint>) -> Self {
        if feed.endpoint().is_enabled() {
            self.advisory_feeds.push(feed);
        } else {
            debug!(
                language = %feed.endpoint().language(),
                "advisory feed has no auth token; skipping"
            );
        }
        self
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    async fn registry_entries(
        &self,
        names: &[String],
        language: Language,
    ) -> FetchBatch<RegistryEntry> {
        match language {
            Language::Node => self.npm_registry.fetch(names).await,
            Language::Rust => self.crates_io.fetch(names).await,
            Language::Python => {
                debug!(language = %language, "no registry endpoint for ecosystem");
                FetchBatch::all_missed(names)
            }
        }
    }

    async fn quality_scores(
        &self,
        names: &[String],
        language: Language,
    ) -> FetchBatch<QualityScore> {
        match language {
            Language::Node => self.npms_io.fetch(names).await,
            Language::Rust => self.crates_io_quality.fetch(names).await,
            Language::Python => {
                debug!(language = %language, "no quality score endpoint for ecosystem");
                FetchBatch::all_missed(names)
            }
        }
    }

    async fn breaches(&self, accounts: &[String]) -> FetchBatch<BreachRecord> {
        self.hibp.fetch(accounts).await
    }

    async fn advisories(&self, names: &[String], language: Language) -> FetchBatch<FeedAdvisory> {
        match self
            .advisory_feeds
            .iter()
            .find(|feed| feed.endpoint().language() == language)
        {
            Some(feed) => feed.fetch_paged(names).await,
            None => FetchBatch::default(),
        }
    }
}
