use crate::risk_scoring::domain::{Scan, ScanId, ScanStatus, ScanTarget};
use crate::shared::Result;
use chrono::{DateTime, Duration, Utc};

/// ScanRepository port for scan lifecycle rows
///
/// Claims and updates are conditional writes so that only one worker holds
/// a scan at a time.
pub trait ScanRepository: Send + Sync {
    /// Inserts a queued scan. Used by the request layer and tests.
    fn create_scan(&self, target: ScanTarget, now: DateTime<Utc>) -> Result<Scan>;

    fn scan(&self, id: ScanId) -> Result<Option<Scan>>;

    /// Atomically picks the oldest scan in `status` without a live lease and
    /// leases it to `holder` until `now + lease`.
    ///
    /// Leasing does not touch `updated_at`.
    fn claim_next_scan(
        &self,
        status: ScanStatus,
        holder: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Scan>>;

    /// Writes `scan` if the stored row is still in `expected` status and is
    /// leased to `holder`.
    ///
    /// # Errors
    /// Returns `ScanError::ScanConflict` when the condition fails.
    fn update_scan(&self, scan: &Scan, expected: ScanStatus, holder: &str) -> Result<Scan>;

    /// Extends `holder`'s lease to `now + lease`.
    ///
    /// # Errors
    /// Returns `ScanError::LeaseLost` when another worker has claimed the
    /// scan or the lease was released.
    fn renew_lease(
        &self,
        id: ScanId,
        holder: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<()>;

    /// Drops `holder`'s lease, if it still holds one.
    fn release_scan(&self, id: ScanId, holder: &str) -> Result<()>;

    /// Marks a non-terminal scan canceled regardless of lease.
    fn cancel_scan(&self, id: ScanId, now: DateTime<Utc>) -> Result<Scan>;
}
