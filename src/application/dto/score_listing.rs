use super::summaries::{BackfillSummary, ScoreSummary};
use crate::risk_scoring::domain::{GraphId, PackageManager, Report};
use std::path::PathBuf;

/// Request to score a saved dependency listing
#[derive(Debug, Clone)]
pub struct ScoreListingRequest {
    pub listing_path: PathBuf,
    pub package_manager: PackageManager,
    /// Skip fetching registry metadata and quality scores
    pub offline: bool,
}

/// Reports produced for one listing
#[derive(Debug, Clone)]
pub struct ListingScores {
    pub graph_id: GraphId,
    /// Reports in visitation order, dependencies first
    pub reports: Vec<Report>,
    pub summary: ScoreSummary,
    pub backfill: Option<BackfillSummary>,
}
