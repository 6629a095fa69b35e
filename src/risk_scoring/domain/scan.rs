use super::ids::{GraphId, ScanId};
use crate::shared::error::ScanError;
use crate::shared::security::{validate_manifest_url, validate_package_name, validate_package_version};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dist-tag meaning "only the most recently published release".
pub const LATEST_VERSION_TAG: &str = "latest";

/// Lifecycle status of a scan.
///
/// ```text
/// queued -> started -> succeeded | failed | canceled
/// ```
/// A queued scan may also fail or be canceled before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Started,
    Succeeded,
    Failed,
    Canceled,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanStatus::Succeeded | ScanStatus::Failed | ScanStatus::Canceled
        )
    }

    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        use ScanStatus::*;
        matches!(
            (self, next),
            (Queued, Started)
                | (Queued, Failed)
                | (Queued, Canceled)
                | (Started, Succeeded)
                | (Started, Failed)
                | (Started, Canceled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Started => "started",
            ScanStatus::Succeeded => "succeeded",
            ScanStatus::Failed => "failed",
            ScanStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency manifest to fetch inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyFileUrl {
    pub filename: String,
    pub url: String,
}

/// What a scan analyzes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanTarget {
    /// A registry package. `version` absent means every release version,
    /// `"latest"` means the most recent release only.
    Package {
        name: String,
        version: Option<String>,
    },
    /// A set of manifest/lock files resolved together in one job.
    DependencyFiles { urls: Vec<DependencyFileUrl> },
}

impl ScanTarget {
    pub fn validate(&self) -> Result<(), ScanError> {
        match self {
            ScanTarget::Package { name, version } => {
                validate_package_name(name)?;
                if let Some(version) = version {
                    validate_package_version(version)?;
                }
                Ok(())
            }
            ScanTarget::DependencyFiles { urls } => {
                if urls.is_empty() {
                    return Err(ScanError::Validation {
                        message: "a dependency file scan needs at least one URL".to_string(),
                    });
                }
                for file in urls {
                    if file.filename.is_empty() || file.filename.contains(&['/', '\\'][..]) {
                        return Err(ScanError::Validation {
                            message: format!("invalid dependency filename {:?}", file.filename),
                        });
                    }
                    validate_manifest_url(&file.url)?;
                }
                Ok(())
            }
        }
    }

    pub fn package_name(&self) -> Option<&str> {
        match self {
            ScanTarget::Package { name, .. } => Some(name),
            ScanTarget::DependencyFiles { .. } => None,
        }
    }
}

/// Exclusive hold on a scan by one orchestrator worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub holder: String,
    pub expires_at: DateTime<Utc>,
}

/// One analysis request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub target: ScanTarget,
    pub status: ScanStatus,
    pub job_names: Vec<String>,
    pub graph_ids: Vec<GraphId>,
    pub lease: Option<Lease>,
    pub inserted_at: DateTime<Utc>,
    /// Last status or job-set change; drives staleness
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    pub fn new(id: ScanId, target: ScanTarget, now: DateTime<Utc>) -> Self {
        Self {
            id,
            target,
            status: ScanStatus::Queued,
            job_names: Vec::new(),
            graph_ids: Vec::new(),
            lease: None,
            inserted_at: now,
            updated_at: now,
        }
    }

    /// Moves the scan to `next`, refusing any edge outside the lifecycle.
    pub fn transition(&mut self, next: ScanStatus, now: DateTime<Utc>) -> Result<(), ScanError> {
        if !self.status.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                scan_id: self.id.value(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_stale(&self, now: DateTime<Utc>, bound: Duration) -> bool {
        now - self.updated_at > bound
    }

    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease
            .as_ref()
            .map(|lease| lease.expires_at > now)
            .unwrap_or(false)
    }
}
