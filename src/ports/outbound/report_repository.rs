use crate::risk_scoring::domain::{GraphId, Report, ScoredPackage};
use crate::shared::Result;
use chrono::{DateTime, Utc};

/// ReportRepository port for scoring output
///
/// Reports are append-only. "Latest" is resolved at read time.
pub trait ReportRepository: Send + Sync {
    /// Persists one graph's reports in visitation order.
    ///
    /// Dependency package version ids are resolved to the report ids saved
    /// in the same call, falling back to the latest stored report.
    fn save_reports(&self, scored: Vec<ScoredPackage>) -> Result<Vec<Report>>;

    /// Most recent report for (name, version), optionally only those scored
    /// after `scored_after`.
    fn latest_report(
        &self,
        name: &str,
        version: &str,
        scored_after: Option<DateTime<Utc>>,
    ) -> Result<Option<Report>>;

    fn reports_for_graph(&self, graph_id: GraphId) -> Result<Vec<Report>>;
}
