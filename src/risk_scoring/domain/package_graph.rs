use super::dependency_link::DependencyLink;
use super::ids::{GraphId, LinkId, PackageVersionId};
use super::package_version::{PackageManager, PackageVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A graph snapshot that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPackageGraph {
    pub root_package_version_id: Option<PackageVersionId>,
    pub link_ids: BTreeSet<LinkId>,
    pub package_manager: PackageManager,
    pub package_manager_version: Option<String>,
}

/// Immutable snapshot of one dependency resolution.
///
/// A new resolution always produces a new `PackageGraph`; the link set of a
/// persisted graph never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageGraph {
    pub id: GraphId,
    pub root_package_version_id: Option<PackageVersionId>,
    pub link_ids: BTreeSet<LinkId>,
    pub package_manager: PackageManager,
    pub package_manager_version: Option<String>,
    pub inserted_at: DateTime<Utc>,
}

impl PackageGraph {
    pub fn from_new(id: GraphId, new: NewPackageGraph, inserted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            root_package_version_id: new.root_package_version_id,
            link_ids: new.link_ids,
            package_manager: new.package_manager,
            package_manager_version: new.package_manager_version,
            inserted_at,
        }
    }

    /// True when `new` describes exactly this snapshot.
    pub fn same_resolution(&self, new: &NewPackageGraph) -> bool {
        self.root_package_version_id == new.root_package_version_id
            && self.link_ids == new.link_ids
            && self.package_manager == new.package_manager
            && self.package_manager_version == new.package_manager_version
    }
}

/// A graph with its links and node rows loaded.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    pub graph: PackageGraph,
    pub links: Vec<DependencyLink>,
    pub nodes: BTreeMap<PackageVersionId, PackageVersion>,
}

impl ResolvedGraph {
    /// Distinct node ids: the root plus every link endpoint.
    pub fn node_ids(&self) -> BTreeSet<PackageVersionId> {
        self.graph
            .root_package_version_id
            .into_iter()
            .chain(self.links.iter().flat_map(|l| [l.parent_id, l.child_id]))
            .collect()
    }

    pub fn edges(&self) -> Vec<(PackageVersionId, PackageVersionId)> {
        self.links.iter().map(DependencyLink::as_pair).collect()
    }

    pub fn node(&self, id: PackageVersionId) -> Option<&PackageVersion> {
        self.nodes.get(&id)
    }
}
