//! depwatch - supply-chain risk scoring for package ecosystems
//!
//! This library builds dependency graphs from package-manager output,
//! orchestrates sandboxed scan jobs and scores every package version in a
//! graph, following hexagonal architecture and Domain-Driven Design principles.
//!
//! # Architecture
//!
//! The library is organized into the following layers:
//!
//! - **Domain Layer** (`risk_scoring`): Domain models and the pure graph traversal and scoring services
//! - **Application Layer** (`application`): Task-output parsers and use cases
//! - **Ports** (`ports`): Interface definitions for infrastructure
//! - **Adapters** (`adapters`): Concrete implementations of ports
//! - **Shared** (`shared`): Common utilities and error types
//!
//! # Example
//!
//! ```no_run
//! use depwatch::prelude::*;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let store = Arc::new(InMemoryStore::default());
//! let use_case = ScoreListingUseCase::<_, _, _, HttpSignalSource>::new(
//!     FileSystemReader::new(),
//!     StderrProgressReporter::new(),
//!     store,
//!     None,
//! );
//!
//! let scores = use_case
//!     .execute(ScoreListingRequest {
//!         listing_path: PathBuf::from("npm-list.json"),
//!         package_manager: PackageManager::Npm,
//!         offline: true,
//!     })
//!     .await?;
//!
//! for report in &scores.reports {
//!     println!("{}@{}: {:?}", report.package(), report.version(), report.summary.grade());
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod application;
pub mod ports;
pub mod risk_scoring;
pub mod shared;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::outbound::console::StderrProgressReporter;
    pub use crate::adapters::outbound::filesystem::{FileSystemReader, SpoolInbox};
    pub use crate::adapters::outbound::network::{
        FetchSettings, HttpSignalSource, PagedSignalEndpoint, ReqwestTransport, SignalEndpoint,
        SignalFetcher,
    };
    pub use crate::adapters::outbound::sandbox::HttpJobSandbox;
    pub use crate::adapters::outbound::storage::InMemoryStore;
    pub use crate::adapters::outbound::SystemClock;
    pub use crate::application::dto::{
        BackfillSummary, CycleOutcome, ListingScores, ScoreListingRequest, ScoreSummary,
    };
    pub use crate::application::use_cases::{
        DispatchSettings, OrchestratorSettings, ResultIngester, ScanOrchestrator, ScoreGraphs,
        ScoreListingUseCase, SignalBackfill,
    };
    pub use crate::ports::outbound::{
        Clock, FetchBatch, JobSandbox, JobSpec, ListingReader, ProgressReporter, ResultSource,
        RiskStore, SignalSource, SignalTransport,
    };
    pub use crate::risk_scoring::domain::{
        Grade, Language, PackageManager, Report, ResultEnvelope, Scan, ScanStatus, ScanTarget,
    };
    pub use crate::risk_scoring::services::{DependencyDigraph, ScoreEngine};
    pub use crate::shared::error::{ExitCode, FetchError, ScanError};
    pub use crate::shared::Result;
}
