/// Data Transfer Objects for application layer
///
/// Parsed task output flows from the parsers into the graph builder and
/// the advisory store; summaries flow back out of the use cases.
mod dependency_listing;
mod score_listing;
mod summaries;

pub use dependency_listing::{DependencyListing, PackageRef, ParsedAdvisory, ParsedTaskOutput};
pub use score_listing::{ListingScores, ScoreListingRequest};
pub use summaries::{BackfillSummary, CycleOutcome, IngestSummary, ScoreSummary};
