use super::graph_traversal::DependencyDigraph;
use crate::risk_scoring::domain::{
    PackageVersionId, QualityScore, RegistryEntry, ResolvedGraph, ScoredPackage, Severity,
    SeverityCounts,
};
use crate::shared::error::ScanError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, warn};

/// Signals gathered for one node before scoring.
#[derive(Debug, Clone, Default)]
pub struct NodeSignals {
    /// Raw severity labels of the advisories that impact this node
    pub advisory_severities: Vec<Option<String>>,
    pub registry: Option<RegistryEntry>,
    pub quality: Option<QualityScore>,
}

/// Result of scoring one graph.
#[derive(Debug)]
pub struct GraphScoring {
    /// One entry per scored node, in visitation order
    pub reports: Vec<ScoredPackage>,
    /// Batches in the order they were visited
    pub visit_order: Vec<Vec<PackageVersionId>>,
    /// Nodes that could not be scored on their own signals
    pub skipped: Vec<(PackageVersionId, ScanError)>,
}

/// ScoreEngine service for leaf-first risk aggregation
///
/// Pure logic: callers load the graph and per-node signals, the engine
/// returns unsaved [`ScoredPackage`]s.
pub struct ScoreEngine;

impl ScoreEngine {
    /// Scores every node of `graph`, dependencies before dependents.
    ///
    /// Each node folds the direct and indirect counts of its direct
    /// dependencies into its own indirect counts. Its total dependency count
    /// is the number of distinct packages reachable from it.
    ///
    /// Members of one cycle are scored in the same batch, in id order. A
    /// member whose cycle partner has not been scored yet folds in that
    /// partner's direct counts only, so counts inflate around true cycles.
    ///
    /// Quality scores are checked for the whole batch before any member is
    /// scored. A member without one is skipped, and a batch partner that
    /// depends on it raises regardless of id order.
    ///
    /// # Errors
    /// - [`ScanError::EmptyGraph`] if the graph has no nodes
    /// - [`ScanError::UnresolvedDependency`] if a node depends on a node that
    ///   was skipped
    /// - [`ScanError::MissingPackageVersion`] if a node row was not loaded
    ///
    /// A node without a quality score is skipped and listed in
    /// [`GraphScoring::skipped`]; it is never scored as zero.
    pub fn score_graph(
        graph: &ResolvedGraph,
        signals: &BTreeMap<PackageVersionId, NodeSignals>,
        scoring_date: DateTime<Utc>,
    ) -> Result<GraphScoring, ScanError> {
        let node_ids = graph.node_ids();
        if node_ids.is_empty() {
            return Err(ScanError::EmptyGraph {
                graph: graph.graph.id.to_string(),
            });
        }

        let digraph = DependencyDigraph::new(node_ids, graph.edges());
        let batches = digraph.outer_in_batches()?;

        let mut scored: BTreeMap<PackageVersionId, ScoredPackage> = BTreeMap::new();
        let mut order: Vec<PackageVersionId> = Vec::new();
        let mut skipped = Vec::new();

        for batch in &batches {
            debug!(graph = %graph.graph.id, size = batch.len(), "scoring batch");

            let own_counts: BTreeMap<PackageVersionId, SeverityCounts> = batch
                .iter()
                .map(|&id| {
                    let package = graph.node(id).map(|n| n.name()).unwrap_or("<unknown>");
                    let severities = signals
                        .get(&id)
                        .map(|s| s.advisory_severities.as_slice())
                        .unwrap_or(&[]);
                    (id, Self::direct_counts(package, severities))
                })
                .collect();
            let mut skipped_in_batch: BTreeSet<PackageVersionId> = BTreeSet::new();
            for &id in batch {
                if let Some(e) = Self::missing_quality(id, graph, signals)? {
                    error!(graph = %graph.graph.id, node = %id, "skipping node: {}", e);
                    skipped_in_batch.insert(id);
                    skipped.push((id, e));
                }
            }

            for &id in batch.iter().filter(|id| !skipped_in_batch.contains(id)) {
                let context = BatchContext {
                    scored: &scored,
                    own_counts: &own_counts,
                    skipped_in_batch: &skipped_in_batch,
                };
                let report =
                    Self::score_node(id, graph, &digraph, signals, &context, scoring_date)?;
                scored.insert(id, report);
                order.push(id);
            }
        }

        let reports = order
            .into_iter()
            .filter_map(|id| scored.remove(&id))
            .collect();

        Ok(GraphScoring {
            reports,
            visit_order: batches,
            skipped,
        })
    }

    /// Counts severities into buckets, logging labels that fit none.
    pub fn direct_counts(package: &str, severities: &[Option<String>]) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for label in severities {
            match label.as_deref().and_then(Severity::parse) {
                Some(severity) => counts.record(severity),
                None => warn!(
                    package,
                    severity = ?label,
                    "advisory severity matches no bucket; excluded from counts"
                ),
            }
        }
        counts
    }

    /// The skip reason for `id` when it has no quality score.
    fn missing_quality(
        id: PackageVersionId,
        graph: &ResolvedGraph,
        signals: &BTreeMap<PackageVersionId, NodeSignals>,
    ) -> Result<Option<ScanError>, ScanError> {
        if signals.get(&id).and_then(|s| s.quality.as_ref()).is_some() {
            return Ok(None);
        }
        let node = graph
            .node(id)
            .ok_or(ScanError::MissingPackageVersion { id: id.value() })?;
        Ok(Some(ScanError::MissingQualityScore {
            package: node.name().to_string(),
            version: node.version().to_string(),
        }))
    }

    fn score_node(
        id: PackageVersionId,
        graph: &ResolvedGraph,
        digraph: &DependencyDigraph,
        signals: &BTreeMap<PackageVersionId, NodeSignals>,
        context: &BatchContext<'_>,
        scoring_date: DateTime<Utc>,
    ) -> Result<ScoredPackage, ScanError> {
        let node = graph
            .node(id)
            .ok_or(ScanError::MissingPackageVersion { id: id.value() })?;
        let node_signals = signals.get(&id);

        let quality = node_signals
            .and_then(|s| s.quality.as_ref())
            .ok_or_else(|| ScanError::MissingQualityScore {
                package: node.name().to_string(),
                version: node.version().to_string(),
            })?;

        let dependencies = digraph.dependencies_of(id);
        let mut indirect = SeverityCounts::default();

        for dependency in &dependencies {
            if let Some(report) = context.scored.get(dependency) {
                indirect += report.direct;
                indirect += report.indirect;
            } else if let (Some(counts), false) = (
                context.own_counts.get(dependency),
                context.skipped_in_batch.contains(dependency),
            ) {
                // Cycle partner not scored yet in this pass
                indirect += *counts;
            } else {
                let dependency_name = graph
                    .node(*dependency)
                    .map(|n| n.key.to_string())
                    .unwrap_or_else(|| dependency.to_string());
                return Err(ScanError::UnresolvedDependency {
                    package: node.key.to_string(),
                    dependency: dependency_name,
                });
            }
        }

        let registry = node_signals.and_then(|s| s.registry.as_ref());

        Ok(ScoredPackage {
            package_version_id: id,
            package: node.name().to_string(),
            version: node.version().to_string(),
            release_date: registry.and_then(|r| r.published_at),
            scoring_date,
            quality_score: quality.score,
            quality_scored_version: quality.package_version.clone(),
            direct: context.own_counts.get(&id).copied().unwrap_or_default(),
            indirect,
            authors: registry.map(RegistryEntry::author_count),
            contributors: registry.map(RegistryEntry::contributor_count),
            immediate_deps: dependencies.len() as u32,
            all_deps: digraph.descendant_count(id) as u32,
            graph_id: Some(graph.graph.id),
            dependency_ids: dependencies,
        })
    }
}

struct BatchContext<'a> {
    scored: &'a BTreeMap<PackageVersionId, ScoredPackage>,
    own_counts: &'a BTreeMap<PackageVersionId, SeverityCounts>,
    skipped_in_batch: &'a BTreeSet<PackageVersionId>,
}
