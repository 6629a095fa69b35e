/// Console adapters for interactive output
mod progress_reporter;

pub use progress_reporter::StderrProgressReporter;
