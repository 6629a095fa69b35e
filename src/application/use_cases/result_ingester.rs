use super::graph_builder::{GraphBuilder, PackageIdCache};
use crate::application::dto::{IngestSummary, PackageRef, ParsedAdvisory, ParsedTaskOutput};
use crate::application::parsers::parse_task;
use crate::ports::outbound::{
    AdvisoryRepository, JobResultRepository, PackageGraphRepository, ResultSource,
};
use crate::risk_scoring::domain::{AdvisoryKey, Language, Scan};
use crate::shared::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// ResultIngester - persists delivered job results and turns them into
/// graphs and advisories
///
/// Receiving is an idempotent upsert keyed on the message id; a delivery is
/// acknowledged only after the upsert succeeded.
pub struct ResultIngester<S> {
    store: Arc<S>,
    graph_builder: GraphBuilder<S>,
}

impl<S> ResultIngester<S>
where
    S: PackageGraphRepository + AdvisoryRepository + JobResultRepository,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            graph_builder: GraphBuilder::new(Arc::clone(&store)),
            store,
        }
    }

    /// Drains up to `max` deliveries from `source` into the store.
    ///
    /// # Returns
    /// Number of deliveries that carried a message id not seen before.
    pub async fn drain<R: ResultSource + ?Sized>(&self, source: &R, max: usize) -> Result<usize> {
        let deliveries = source.receive(max).await?;
        let mut fresh = 0;

        for delivery in deliveries {
            let message_id = delivery.envelope.message_id.clone();
            match self.store.apply_envelope(delivery.envelope) {
                Ok(is_new) => {
                    if is_new {
                        fresh += 1;
                    } else {
                        debug!(%message_id, "ignoring redelivered result");
                    }
                    source.ack(&delivery.receipt).await?;
                }
                Err(e) => {
                    warn!(%message_id, error = %e, "failed to persist result; returning it for redelivery");
                    source.nack(&delivery.receipt).await?;
                }
            }
        }

        Ok(fresh)
    }

    /// Parses every stored result of `scan`'s jobs into graphs and advisories.
    ///
    /// Unparseable or unrecognized tasks are logged and counted as skipped.
    /// Listings are built before advisories are linked.
    #[instrument(skip_all, fields(scan = %scan.id))]
    pub fn ingest_scan(&self, scan: &Scan) -> Result<IngestSummary> {
        let mut cache = PackageIdCache::new();
        let mut summary = IngestSummary::default();
        let mut advisories: Vec<(Language, ParsedAdvisory)> = Vec::new();

        for job_name in &scan.job_names {
            for envelope in self.store.envelopes_for_job(job_name)? {
                for task in envelope.task_results() {
                    match parse_task(task) {
                        Ok(Some((_, ParsedTaskOutput::Dependencies(listing)))) => {
                            if let Some(graph) = self.graph_builder.build(&listing, &mut cache)? {
                                if !summary.graph_ids.contains(&graph.id) {
                                    summary.graph_ids.push(graph.id);
                                }
                            }
                        }
                        Ok(Some((package_manager, ParsedTaskOutput::Advisories(parsed)))) => {
                            let language = package_manager.language();
                            advisories.extend(parsed.into_iter().map(|a| (language, a)));
                        }
                        Ok(Some((_, ParsedTaskOutput::Nothing))) => {}
                        Ok(None) => summary.skipped_tasks += 1,
                        Err(e) => {
                            error!(
                                job = %job_name,
                                message_id = %envelope.message_id,
                                task = %task.name,
                                error = %format!("{:#}", e),
                                "failed to parse task output"
                            );
                            summary.skipped_tasks += 1;
                        }
                    }
                }
            }
        }

        for (language, advisory) in advisories {
            self.ingest_advisory(language, advisory, &mut cache)?;
            summary.advisories += 1;
        }

        info!(
            graphs = summary.graph_ids.len(),
            advisories = summary.advisories,
            skipped_tasks = summary.skipped_tasks,
            "ingested scan results"
        );
        Ok(summary)
    }

    fn ingest_advisory(
        &self,
        language: Language,
        advisory: ParsedAdvisory,
        cache: &mut PackageIdCache,
    ) -> Result<()> {
        let mut impacted = BTreeSet::new();
        for version in &advisory.impacted_versions {
            let package = PackageRef::new(advisory.fields.package_name.as_str(), version.as_str());
            if let Some(id) = self.graph_builder.package_id(&package, language, cache)? {
                impacted.insert(id);
            }
        }

        let key = AdvisoryKey {
            language,
            source_id: advisory.source_id,
        };
        let stored = self.store.upsert_advisory(key, advisory.fields, &impacted)?;
        debug!(advisory = %stored.id, impacted = stored.impacted_version_ids.len(), "upserted advisory");
        Ok(())
    }
}
