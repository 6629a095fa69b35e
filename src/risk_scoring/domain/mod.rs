pub mod advisory;
pub mod dependency_link;
pub mod ids;
pub mod job_result;
pub mod package_graph;
pub mod package_version;
pub mod report;
pub mod scan;
pub mod signals;

pub use advisory::{
    parse_cwe, version_in_range, Advisory, AdvisoryFields, AdvisoryKey, Severity,
};
pub use dependency_link::DependencyLink;
pub use ids::{AdvisoryId, GraphId, LinkId, PackageVersionId, ReportId, ScanId};
pub use job_result::{ResultEnvelope, ResultInbox, TaskLine, TaskResult, JOB_NAME_ATTRIBUTE};
pub use package_graph::{NewPackageGraph, PackageGraph, ResolvedGraph};
pub use package_version::{Language, PackageManager, PackageVersion, PackageVersionKey, Provenance};
pub use report::{Grade, Report, ScoredPackage, SeverityCounts};
pub use scan::{DependencyFileUrl, Lease, Scan, ScanStatus, ScanTarget, LATEST_VERSION_TAG};
pub use signals::{BreachRecord, FeedAdvisory, QualityScore, RegistryEntry};
