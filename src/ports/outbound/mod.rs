/// Outbound ports (Driven ports) - Infrastructure interfaces
///
/// These ports define the interfaces that the application core uses to reach
/// the store, the job sandbox, the result delivery channel and third-party
/// metadata endpoints.
pub mod advisory_repository;
pub mod clock;
pub mod job_result_repository;
pub mod job_sandbox;
pub mod listing_reader;
pub mod package_graph_repository;
pub mod progress_reporter;
pub mod report_repository;
pub mod result_source;
pub mod scan_repository;
pub mod signal_repository;
pub mod signal_source;
pub mod signal_transport;

pub use advisory_repository::AdvisoryRepository;
pub use clock::Clock;
pub use job_result_repository::JobResultRepository;
pub use job_sandbox::{JobSandbox, JobSpec};
pub use listing_reader::ListingReader;
pub use package_graph_repository::PackageGraphRepository;
pub use progress_reporter::ProgressReporter;
pub use report_repository::ReportRepository;
pub use result_source::{Delivery, ResultSource};
pub use scan_repository::ScanRepository;
pub use signal_repository::SignalRepository;
pub use signal_source::{FetchBatch, SignalSource};
pub use signal_transport::{HttpMethod, SignalRequest, SignalResponse, SignalTransport};

/// Every repository the pipeline persists through, as one bound.
pub trait RiskStore:
    PackageGraphRepository
    + AdvisoryRepository
    + SignalRepository
    + ReportRepository
    + ScanRepository
    + JobResultRepository
{
}

impl<T> RiskStore for T where
    T: PackageGraphRepository
        + AdvisoryRepository
        + SignalRepository
        + ReportRepository
        + ScanRepository
        + JobResultRepository
{
}
