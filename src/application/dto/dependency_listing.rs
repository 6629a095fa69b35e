use crate::risk_scoring::domain::{AdvisoryFields, Language, PackageManager};
use std::collections::BTreeSet;

/// A package as named by resolver output, before it has a row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageRef {
    pub name: String,
    pub version: String,
    /// Resolved distribution URL, when the resolver reports one
    pub url: Option<String>,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }
}

/// Resolved dependency tree of one `list_metadata` task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyListing {
    pub package_manager: PackageManager,
    pub package_manager_version: Option<String>,
    /// The package the listing was resolved for; absent for manifest scans
    pub root: Option<PackageRef>,
    /// (parent, direct children) records
    pub edges: Vec<(PackageRef, Vec<PackageRef>)>,
}

impl DependencyListing {
    pub fn new(package_manager: PackageManager) -> Self {
        Self {
            package_manager,
            package_manager_version: None,
            root: None,
            edges: Vec::new(),
        }
    }

    pub fn language(&self) -> Language {
        self.package_manager.language()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none() && self.edges.iter().all(|(_, children)| children.is_empty())
    }
}

/// One advisory from an `audit` task plus the versions it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAdvisory {
    pub source_id: String,
    pub fields: AdvisoryFields,
    pub impacted_versions: BTreeSet<String>,
}

/// Output of a task parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedTaskOutput {
    Dependencies(DependencyListing),
    Advisories(Vec<ParsedAdvisory>),
    Nothing,
}
