use crate::risk_scoring::domain::{
    DependencyLink, GraphId, Language, LinkId, NewPackageGraph, PackageGraph, PackageVersion,
    PackageVersionId, PackageVersionKey, Provenance, ResolvedGraph,
};
use crate::shared::error::ScanError;
use crate::shared::Result;
use std::collections::{BTreeMap, BTreeSet};

/// PackageGraphRepository port for package versions, links and graph snapshots
///
/// Every write is insert-if-absent on the entity's natural key, so replaying
/// the same input never creates duplicate rows.
pub trait PackageGraphRepository: Send + Sync {
    /// Returns the id for `key`, inserting a new row on first sight.
    ///
    /// Provenance fields that are still unset on an existing row are filled
    /// from `provenance`; set fields are kept.
    fn insert_package_version_if_absent(
        &self,
        key: &PackageVersionKey,
        provenance: &Provenance,
    ) -> Result<PackageVersionId>;

    fn find_package_version(&self, key: &PackageVersionKey) -> Result<Option<PackageVersion>>;

    fn package_versions(&self, ids: &BTreeSet<PackageVersionId>) -> Result<Vec<PackageVersion>>;

    /// Every known package version of one ecosystem.
    fn package_versions_in(&self, language: Language) -> Result<Vec<PackageVersion>>;

    /// Returns the id of the (parent, child) link, inserting it on first sight.
    fn insert_link_if_absent(
        &self,
        parent: PackageVersionId,
        child: PackageVersionId,
    ) -> Result<LinkId>;

    fn links(&self, ids: &BTreeSet<LinkId>) -> Result<Vec<DependencyLink>>;

    /// Persists a graph snapshot, or returns the existing one with the same
    /// root, link set and package manager.
    fn insert_graph_if_absent(&self, graph: NewPackageGraph) -> Result<PackageGraph>;

    fn graph(&self, id: GraphId) -> Result<Option<PackageGraph>>;

    /// Most recently inserted graph in which `id` is the parent of some link.
    fn latest_graph_with_parent(&self, id: PackageVersionId) -> Result<Option<PackageGraph>>;

    fn package_version_count(&self) -> Result<usize>;

    fn link_count(&self) -> Result<usize>;

    /// Loads a graph with its links and node rows.
    ///
    /// # Errors
    /// Returns an error if the graph does not exist or a node row is missing.
    fn resolve_graph(&self, id: GraphId) -> Result<ResolvedGraph> {
        let graph = self
            .graph(id)?
            .ok_or_else(|| anyhow::anyhow!("{} not found", id))?;
        let links = self.links(&graph.link_ids)?;

        let node_ids: BTreeSet<PackageVersionId> = graph
            .root_package_version_id
            .into_iter()
            .chain(links.iter().flat_map(|l| [l.parent_id, l.child_id]))
            .collect();
        let nodes: BTreeMap<PackageVersionId, PackageVersion> = self
            .package_versions(&node_ids)?
            .into_iter()
            .map(|pv| (pv.id, pv))
            .collect();

        if let Some(missing) = node_ids.iter().find(|id| !nodes.contains_key(id)) {
            return Err(ScanError::MissingPackageVersion { id: missing.value() }.into());
        }

        Ok(ResolvedGraph {
            graph,
            links,
            nodes,
        })
    }
}
