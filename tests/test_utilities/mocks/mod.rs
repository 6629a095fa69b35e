/// Mock implementations for testing
mod mock_clock;
mod mock_listing_reader;
mod mock_progress_reporter;
mod mock_result_source;
mod mock_sandbox;
mod mock_signal_source;
mod mock_transport;

pub use mock_clock::ManualClock;
pub use mock_listing_reader::MockListingReader;
pub use mock_progress_reporter::MockProgressReporter;
pub use mock_result_source::MockInbox;
pub use mock_sandbox::MockSandbox;
pub use mock_signal_source::MockSignalSource;
pub use mock_transport::MockTransport;
