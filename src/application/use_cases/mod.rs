/// Use cases module containing application business logic orchestration
mod graph_builder;
mod job_dispatcher;
mod result_ingester;
mod scan_orchestrator;
mod score_graphs;
mod score_listing;
mod signal_backfill;

pub use graph_builder::{GraphBuilder, PackageIdCache};
pub use job_dispatcher::{DispatchSettings, JobDispatcher};
pub use result_ingester::ResultIngester;
pub use scan_orchestrator::{OrchestratorSettings, ScanOrchestrator};
pub use score_graphs::ScoreGraphs;
pub use score_listing::ScoreListingUseCase;
pub use signal_backfill::SignalBackfill;
