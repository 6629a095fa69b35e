use super::ids::{LinkId, PackageVersionId};
use serde::{Deserialize, Serialize};

/// Directed parent -> child edge between two package versions.
///
/// Unique per ordered (parent, child) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyLink {
    pub id: LinkId,
    pub parent_id: PackageVersionId,
    pub child_id: PackageVersionId,
}

impl DependencyLink {
    pub fn is_self_loop(&self) -> bool {
        self.parent_id == self.child_id
    }

    pub fn as_pair(&self) -> (PackageVersionId, PackageVersionId) {
        (self.parent_id, self.child_id)
    }
}
