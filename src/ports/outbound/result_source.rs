use crate::risk_scoring::domain::ResultEnvelope;
use crate::shared::Result;
use async_trait::async_trait;

/// A received envelope plus the handle used to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: String,
    pub envelope: ResultEnvelope,
}

/// ResultSource port for the at-least-once result delivery channel
///
/// A delivery that is neither acked nor nacked is redelivered later.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Receives up to `max` pending deliveries.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Confirms the delivery was persisted; it will not be redelivered.
    async fn ack(&self, receipt: &str) -> Result<()>;

    /// Returns the delivery to the channel for a later attempt.
    async fn nack(&self, receipt: &str) -> Result<()>;
}
