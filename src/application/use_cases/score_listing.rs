use super::graph_builder::{GraphBuilder, PackageIdCache};
use super::score_graphs::ScoreGraphs;
use super::signal_backfill::SignalBackfill;
use crate::application::dto::{ListingScores, ParsedTaskOutput, ScoreListingRequest};
use crate::application::parsers::{parser_for, TaskKind};
use crate::ports::outbound::{ListingReader, ProgressReporter, RiskStore, SignalSource};
use crate::shared::error::ScanError;
use crate::shared::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

const STAGES: usize = 4;

/// ScoreListingUseCase - scores a saved dependency listing in one shot
///
/// Reads the listing, builds its graph, optionally backfills signals and
/// scores every node. Used by the `score` command.
///
/// # Type Parameters
/// * `LR` - ListingReader implementation
/// * `PR` - ProgressReporter implementation
/// * `S` - store implementation
/// * `F` - SignalSource implementation
pub struct ScoreListingUseCase<LR, PR, S, F: ?Sized> {
    listing_reader: LR,
    progress_reporter: PR,
    store: Arc<S>,
    source: Option<Arc<F>>,
}

impl<LR, PR, S, F> ScoreListingUseCase<LR, PR, S, F>
where
    LR: ListingReader,
    PR: ProgressReporter,
    S: RiskStore,
    F: SignalSource + ?Sized,
{
    pub fn new(
        listing_reader: LR,
        progress_reporter: PR,
        store: Arc<S>,
        source: Option<Arc<F>>,
    ) -> Self {
        Self {
            listing_reader,
            progress_reporter,
            store,
            source,
        }
    }

    #[instrument(skip_all, fields(listing = %request.listing_path.display()))]
    pub async fn execute(&self, request: ScoreListingRequest) -> Result<ListingScores> {
        // Step 1: Read and parse the listing
        self.progress_reporter.report(&format!(
            "📖 Loading {} dependency listing from: {}",
            request.package_manager,
            request.listing_path.display()
        ));
        let content = self.listing_reader.read_listing(&request.listing_path)?;
        let parse = parser_for(request.package_manager, TaskKind::ListMetadata).ok_or_else(|| {
            anyhow::anyhow!("no listing parser for {}", request.package_manager)
        })?;
        let listing = match parse(&content)? {
            ParsedTaskOutput::Dependencies(listing) => listing,
            _ => anyhow::bail!("{} did not parse as a dependency listing", request.listing_path.display()),
        };
        self.progress_reporter
            .report_progress(1, STAGES, Some("listing parsed"));

        // Step 2: Build the graph
        let graph = GraphBuilder::new(Arc::clone(&self.store))
            .build(&listing, &mut PackageIdCache::new())?
            .ok_or_else(|| ScanError::EmptyGraph {
                graph: request.listing_path.display().to_string(),
            })?;
        self.progress_reporter.report(&format!(
            "✅ Built graph with {} package(s) and {} link(s)",
            self.store.package_version_count()?,
            graph.link_ids.len()
        ));
        self.progress_reporter
            .report_progress(2, STAGES, Some("graph built"));

        // Step 3: Backfill signals unless offline
        let backfill = match (&self.source, request.offline) {
            (Some(source), false) => {
                self.progress_reporter
                    .report("🔍 Fetching registry metadata and quality scores...");
                let summary = SignalBackfill::new(Arc::clone(&self.store), Arc::clone(source))
                    .backfill(listing.language())
                    .await?;
                if summary.misses > 0 || summary.failures > 0 {
                    self.progress_reporter.report_error(&format!(
                        "⚠️  {} package(s) not found upstream, {} fetch(es) failed",
                        summary.misses, summary.failures
                    ));
                }
                Some(summary)
            }
            _ => None,
        };
        self.progress_reporter
            .report_progress(3, STAGES, Some("signals ready"));

        // Step 4: Score
        self.progress_reporter.report("📊 Scoring packages...");
        let summary = ScoreGraphs::new(Arc::clone(&self.store)).score(&[graph.id], Utc::now())?;
        let reports = self.store.reports_for_graph(graph.id)?;
        self.progress_reporter
            .report_progress(STAGES, STAGES, Some("scored"));

        if summary.is_complete() {
            self.progress_reporter
                .report_completion(&format!("✅ Scored {} package(s)", reports.len()));
        } else {
            self.progress_reporter.report_completion(&format!(
                "⚠️  Scored {} package(s); {} skipped, {} graph(s) failed",
                reports.len(),
                summary.skipped_nodes,
                summary.failed_graphs.len()
            ));
        }

        Ok(ListingScores {
            graph_id: graph.id,
            reports,
            summary,
            backfill,
        })
    }
}
