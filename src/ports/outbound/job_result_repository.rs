use crate::risk_scoring::domain::ResultEnvelope;
use crate::shared::Result;

/// JobResultRepository port for received result envelopes
///
/// Storage is keyed by message id; applying an envelope is idempotent.
pub trait JobResultRepository: Send + Sync {
    /// Applies `envelope` to the stored inbox.
    ///
    /// # Returns
    /// `true` if the message id was new, `false` for a redelivery.
    fn apply_envelope(&self, envelope: ResultEnvelope) -> Result<bool>;

    /// Number of `job_names` that have delivered a `task_complete` line.
    fn completed_job_count(&self, job_names: &[String]) -> Result<usize>;

    /// Stored envelopes of one job, in message-id order.
    fn envelopes_for_job(&self, job_name: &str) -> Result<Vec<ResultEnvelope>>;
}
