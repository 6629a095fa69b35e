use crate::application::dto::ScoreSummary;
use crate::ports::outbound::{
    AdvisoryRepository, PackageGraphRepository, ReportRepository, SignalRepository,
};
use crate::risk_scoring::domain::{GraphId, PackageVersionId, Report, ResolvedGraph};
use crate::risk_scoring::services::{NodeSignals, ScoreEngine};
use crate::shared::error::ScanError;
use crate::shared::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// ScoreGraphs - loads graphs and their signals, scores them and persists
/// the reports
///
/// A graph error aborts only the graph that raised it; every other graph is
/// still scored and saved.
pub struct ScoreGraphs<S> {
    store: Arc<S>,
}

impl<S> ScoreGraphs<S>
where
    S: PackageGraphRepository + AdvisoryRepository + SignalRepository + ReportRepository,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn score(&self, graph_ids: &[GraphId], scoring_date: DateTime<Utc>) -> Result<ScoreSummary> {
        self.score_guarded(graph_ids, scoring_date, || Ok(()))
    }

    /// Scores like [`ScoreGraphs::score`], running `before_save` ahead of
    /// each graph's save.
    ///
    /// An error from `before_save` stops scoring without saving that graph.
    #[instrument(skip_all, fields(graphs = graph_ids.len()))]
    pub fn score_guarded<G>(
        &self,
        graph_ids: &[GraphId],
        scoring_date: DateTime<Utc>,
        before_save: G,
    ) -> Result<ScoreSummary>
    where
        G: Fn() -> Result<()>,
    {
        let mut summary = ScoreSummary::default();

        for &graph_id in graph_ids {
            match self.score_graph(graph_id, scoring_date, &before_save) {
                Ok((reports, skipped)) => {
                    summary.reports += reports.len();
                    summary.skipped_nodes += skipped;
                }
                Err(e) if is_graph_error(&e) => {
                    error!(graph = %graph_id, error = %e, "scoring aborted for graph");
                    summary.failed_graphs.push(graph_id);
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            reports = summary.reports,
            skipped_nodes = summary.skipped_nodes,
            failed_graphs = summary.failed_graphs.len(),
            "scored graphs"
        );
        Ok(summary)
    }

    /// Scores one graph and saves its reports.
    ///
    /// # Returns
    /// The saved reports and the number of skipped nodes.
    pub fn score_graph<G>(
        &self,
        graph_id: GraphId,
        scoring_date: DateTime<Utc>,
        before_save: G,
    ) -> Result<(Vec<Report>, usize)>
    where
        G: Fn() -> Result<()>,
    {
        let resolved = self.store.resolve_graph(graph_id)?;
        let signals = self.gather_signals(&resolved)?;
        let scoring = ScoreEngine::score_graph(&resolved, &signals, scoring_date)?;

        for (node, reason) in &scoring.skipped {
            warn!(graph = %graph_id, %node, reason = %reason, "node left unscored");
        }
        before_save()?;
        let reports = self.store.save_reports(scoring.reports)?;
        Ok((reports, scoring.skipped.len()))
    }

    fn gather_signals(
        &self,
        resolved: &ResolvedGraph,
    ) -> Result<BTreeMap<PackageVersionId, NodeSignals>> {
        let mut signals = BTreeMap::new();
        for (&id, package) in &resolved.nodes {
            let advisory_severities = self
                .store
                .advisories_impacting(id)?
                .into_iter()
                .map(|advisory| advisory.fields.severity)
                .collect();
            let registry =
                self.store
                    .registry_entry(package.name(), package.version(), package.language())?;
            let quality = self.store.quality_score(package.name(), package.version())?;
            signals.insert(
                id,
                NodeSignals {
                    advisory_severities,
                    registry,
                    quality,
                },
            );
        }
        Ok(signals)
    }
}

fn is_graph_error(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ScanError>(),
        Some(
            ScanError::EmptyGraph { .. }
                | ScanError::UnresolvedDependency { .. }
                | ScanError::MissingPackageVersion { .. }
        )
    )
}
