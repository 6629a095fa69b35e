use crate::application::dto::{DependencyListing, PackageRef};
use crate::ports::outbound::PackageGraphRepository;
use crate::risk_scoring::domain::{
    Language, NewPackageGraph, PackageGraph, PackageVersionId, PackageVersionKey, Provenance,
};
use crate::shared::Result;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Package ids already resolved during one ingestion pass.
pub type PackageIdCache = HashMap<PackageVersionKey, PackageVersionId>;

/// GraphBuilder - turns a parsed dependency listing into a persisted graph
///
/// Every package version and link goes through insert-if-absent, so
/// building the same listing twice yields the same graph and no new rows.
pub struct GraphBuilder<S> {
    store: Arc<S>,
}

impl<S: PackageGraphRepository> GraphBuilder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persists `listing` as a graph snapshot.
    ///
    /// # Returns
    /// The stored graph, or `None` when the listing names no root and no
    /// usable edges.
    pub fn build(
        &self,
        listing: &DependencyListing,
        cache: &mut PackageIdCache,
    ) -> Result<Option<PackageGraph>> {
        let language = listing.language();
        let root_id = match &listing.root {
            Some(root) => self.package_id(root, language, cache)?,
            None => None,
        };

        let mut link_ids = BTreeSet::new();
        for (parent, children) in &listing.edges {
            let Some(parent_id) = self.package_id(parent, language, cache)? else {
                continue;
            };
            for child in children {
                let Some(child_id) = self.package_id(child, language, cache)? else {
                    continue;
                };
                if parent_id == child_id {
                    warn!(package = %parent.name, version = %parent.version, "skipping self-dependency");
                    continue;
                }
                link_ids.insert(self.store.insert_link_if_absent(parent_id, child_id)?);
            }
        }

        if root_id.is_none() && link_ids.is_empty() {
            warn!(package_manager = %listing.package_manager, "dependency listing has no packages");
            return Ok(None);
        }

        let graph = self.store.insert_graph_if_absent(NewPackageGraph {
            root_package_version_id: root_id,
            link_ids,
            package_manager: listing.package_manager,
            package_manager_version: listing.package_manager_version.clone(),
        })?;
        debug!(graph = %graph.id, links = graph.link_ids.len(), "built package graph");
        Ok(Some(graph))
    }

    /// Resolves one package reference to its row id.
    ///
    /// References whose name or version fail validation are logged and
    /// yield `None`.
    pub fn package_id(
        &self,
        package: &PackageRef,
        language: Language,
        cache: &mut PackageIdCache,
    ) -> Result<Option<PackageVersionId>> {
        let key = match PackageVersionKey::new(&package.name, &package.version, language) {
            Ok(key) => key,
            Err(e) => {
                warn!(package = %package.name, version = %package.version, error = %e, "skipping invalid package reference");
                return Ok(None);
            }
        };
        if let Some(&id) = cache.get(&key) {
            return Ok(Some(id));
        }
        let id = self
            .store
            .insert_package_version_if_absent(&key, &Provenance::with_url(package.url.clone()))?;
        cache.insert(key, id);
        Ok(Some(id))
    }
}
