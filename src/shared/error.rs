use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application.
///
/// Lets callers tell a clean scoring run apart from one where some nodes
/// could not be scored, and both apart from argument or runtime errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every requested node was scored
    Success = 0,
    /// Scoring finished but at least one node or graph was skipped
    ScoringIncomplete = 1,
    /// Invalid command-line arguments (clap parsing errors)
    InvalidArguments = 2,
    /// Application error (config, network, file I/O, etc.)
    ApplicationError = 3,
}

impl ExitCode {
    /// Convert to i32 for use with std::process::exit
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCode::Success => write!(f, "Success (0)"),
            ExitCode::ScoringIncomplete => write!(f, "Scoring Incomplete (1)"),
            ExitCode::InvalidArguments => write!(f, "Invalid Arguments (2)"),
            ExitCode::ApplicationError => write!(f, "Application Error (3)"),
        }
    }
}

/// Domain and orchestration errors.
///
/// Graph errors abort scoring for a single graph. Orchestration errors are
/// caught by the scan orchestrator and move the owning scan to `failed`.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Cannot score an empty package graph ({graph})\n\n💡 Hint: The dependency listing produced no packages; check the list_metadata task output")]
    EmptyGraph { graph: String },

    #[error("Package {package} depends on {dependency}, which has no report yet\n\n💡 Hint: A dependency could not be scored earlier in this graph; look for a preceding scoring warning")]
    UnresolvedDependency { package: String, dependency: String },

    #[error("Package version {id} is referenced by a graph but was not loaded")]
    MissingPackageVersion { id: u64 },

    #[error("No quality score for {package}@{version}\n\n💡 Hint: Run a signal backfill before scoring, or check that the package exists upstream")]
    MissingQualityScore { package: String, version: String },

    #[error("Scan {scan_id} cannot move from {from} to {to}")]
    InvalidTransition {
        scan_id: u64,
        from: String,
        to: String,
    },

    #[error("Scan {scan_id} was modified concurrently (expected status {expected})")]
    ScanConflict { scan_id: u64, expected: String },

    #[error("Lease on scan {scan_id} is no longer held by {holder}")]
    LeaseLost { scan_id: u64, holder: String },

    #[error("Scan {scan_id} not found")]
    ScanNotFound { scan_id: u64 },

    #[error("Failed to submit job {job_name}\nDetails: {details}\n\n💡 Hint: Verify the sandbox submit_url and credentials in the config file")]
    JobSubmission { job_name: String, details: String },

    #[error("Failed to parse result envelope {message_id}\nDetails: {details}")]
    EnvelopeParse { message_id: String, details: String },

    /// Validation error for untrusted input (package names, versions, URLs)
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Failed to read file: {path}\nDetails: {details}\n\n💡 Hint: Please verify that the file exists and you have read permissions")]
    FileReadError { path: PathBuf, details: String },

    #[error("Security violation: {path}\nReason: {reason}\n\n💡 Hint: {hint}")]
    SecurityError {
        path: PathBuf,
        reason: String,
        hint: String,
    },
}

/// Per-item failure of an outbound metadata fetch.
///
/// `NotFound` is a terminal miss. Everything else except `InvalidRequest`
/// and plain client errors is transient and eligible for retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found upstream: {identifier}")]
    NotFound { identifier: String },

    #[error("request timed out")]
    Timeout,

    #[error("upstream responded with HTTP {status}")]
    Status { status: u16 },

    #[error("malformed response body: {details}")]
    Malformed { details: String },

    #[error("transport error: {details}")]
    Transport { details: String },

    #[error("invalid request: {details}")]
    InvalidRequest { details: String },
}

impl FetchError {
    pub fn is_miss(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NotFound { .. } | FetchError::InvalidRequest { .. } => false,
            FetchError::Status { status } => *status >= 500 || *status == 408 || *status == 429,
            FetchError::Timeout | FetchError::Malformed { .. } | FetchError::Transport { .. } => {
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::ScoringIncomplete.as_i32(), 1);
        assert_eq!(ExitCode::InvalidArguments.as_i32(), 2);
        assert_eq!(ExitCode::ApplicationError.as_i32(), 3);
    }

    #[test]
    fn test_exit_code_display() {
        assert_eq!(format!("{}", ExitCode::Success), "Success (0)");
        assert_eq!(
            format!("{}", ExitCode::ScoringIncomplete),
            "Scoring Incomplete (1)"
        );
        assert_eq!(
            format!("{}", ExitCode::ApplicationError),
            "Application Error (3)"
        );
    }

    #[test]
    fn test_empty_graph_display() {
        let error = ScanError::EmptyGraph {
            graph: "graph 7".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("empty package graph"));
        assert!(display.contains("graph 7"));
        assert!(display.contains("💡 Hint:"));
    }

    #[test]
    fn test_missing_quality_score_display() {
        let error = ScanError::MissingQualityScore {
            package: "left-pad".to_string(),
            version: "1.3.0".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("left-pad@1.3.0"));
        assert!(display.contains("backfill"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = ScanError::InvalidTransition {
            scan_id: 3,
            from: "failed".to_string(),
            to: "started".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Scan 3 cannot move from failed to started"
        );
    }

    #[test]
    fn test_job_submission_display() {
        let error = ScanError::JobSubmission {
            job_name: "scan-1-pkg-abcd1234".to_string(),
            details: "connection refused".to_string(),
        };
        let display = format!("{}", error);
        assert!(display.contains("scan-1-pkg-abcd1234"));
        assert!(display.contains("connection refused"));
        assert!(display.contains("submit_url"));
    }

    #[test]
    fn test_fetch_error_not_found_is_terminal_miss() {
        let error = FetchError::NotFound {
            identifier: "no-such-package".to_string(),
        };
        assert!(error.is_miss());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_fetch_error_transient_kinds_are_retryable() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Status { status: 503 }.is_retryable());
        assert!(FetchError::Status { status: 429 }.is_retryable());
        assert!(FetchError::Malformed {
            details: "eof".to_string()
        }
        .is_retryable());
        assert!(FetchError::Transport {
            details: "reset".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_fetch_error_client_errors_are_not_retried() {
        assert!(!FetchError::Status { status: 400 }.is_retryable());
        assert!(!FetchError::Status { status: 401 }.is_retryable());
        assert!(!FetchError::InvalidRequest {
            details: "bad name".to_string()
        }
        .is_retryable());
    }
}
