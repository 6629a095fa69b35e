use super::job_dispatcher::{DispatchSettings, JobDispatcher};
use super::result_ingester::ResultIngester;
use super::score_graphs::ScoreGraphs;
use super::signal_backfill::SignalBackfill;
use crate::application::dto::{CycleOutcome, IngestSummary, ScoreSummary};
use crate::ports::outbound::{Clock, JobSandbox, ResultSource, RiskStore, SignalSource};
use crate::risk_scoring::domain::{
    GraphId, Language, NewPackageGraph, PackageManager, PackageVersionKey, Provenance, Scan,
    ScanId, ScanStatus, ScanTarget, LATEST_VERSION_TAG,
};
use crate::shared::error::ScanError;
use crate::shared::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Maximum deliveries drained from the result inbox per cycle
const INBOX_BATCH: usize = 100;

/// Timing and identity of one orchestrator worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub worker_id: String,
    /// Sleep after a cycle that found nothing to do
    pub poll_interval: Duration,
    /// Sleep after a cycle that left a started scan waiting
    pub started_poll_interval: Duration,
    /// A started scan not updated for this long is failed
    pub staleness: chrono::Duration,
    pub lease: chrono::Duration,
}

/// ScanOrchestrator - drives scans through their lifecycle
///
/// Each cycle claims at most one queued scan (dispatching its jobs) and at
/// most one started scan (checking for results, then ingesting, backfilling
/// and scoring). Every error is caught here and moves the scan to failed;
/// nothing escapes the poll loop.
pub struct ScanOrchestrator<S, J: ?Sized, F: ?Sized, C: ?Sized> {
    store: Arc<S>,
    clock: Arc<C>,
    dispatcher: JobDispatcher<S, J, F>,
    ingester: ResultIngester<S>,
    backfill: SignalBackfill<S, F>,
    scorer: ScoreGraphs<S>,
    package_manager: PackageManager,
    language: Language,
    settings: OrchestratorSettings,
}

impl<S, J, F, C> ScanOrchestrator<S, J, F, C>
where
    S: RiskStore,
    J: JobSandbox + ?Sized,
    F: SignalSource + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        sandbox: Arc<J>,
        source: Arc<F>,
        clock: Arc<C>,
        dispatch: DispatchSettings,
        settings: OrchestratorSettings,
    ) -> Self {
        let package_manager = dispatch.package_manager;
        Self {
            dispatcher: JobDispatcher::new(
                Arc::clone(&store),
                sandbox,
                Arc::clone(&source),
                dispatch,
            ),
            ingester: ResultIngester::new(Arc::clone(&store)),
            backfill: SignalBackfill::new(Arc::clone(&store), source),
            scorer: ScoreGraphs::new(Arc::clone(&store)),
            store,
            clock,
            package_manager,
            language: package_manager.language(),
            settings,
        }
    }

    /// Polls until the process exits, or for a single cycle with `once`.
    pub async fn run<R: ResultSource + ?Sized>(&self, inbox: &R, once: bool) {
        info!(worker = %self.settings.worker_id, "orchestrator worker started");
        loop {
            self.drain_results(inbox).await;
            let (queued, started) = self.run_cycle().await;
            if once {
                break;
            }

            let pause = match (&queued, &started) {
                (CycleOutcome::Idle, CycleOutcome::Idle) => self.settings.poll_interval,
                (_, CycleOutcome::Waiting { .. }) => self.settings.started_poll_interval,
                _ => Duration::ZERO,
            };
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    /// Moves pending deliveries into the store; failures are logged.
    pub async fn drain_results<R: ResultSource + ?Sized>(&self, inbox: &R) -> usize {
        match self.ingester.drain(inbox, INBOX_BATCH).await {
            Ok(fresh) => {
                if fresh > 0 {
                    debug!(fresh, "drained result inbox");
                }
                fresh
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "failed to drain result inbox");
                0
            }
        }
    }

    /// One poll cycle: advance one queued scan, then one started scan.
    pub async fn run_cycle(&self) -> (CycleOutcome, CycleOutcome) {
        let queued = self.start_next().await.unwrap_or_else(|e| {
            error!(error = %format!("{:#}", e), "failed to claim queued scan");
            CycleOutcome::Idle
        });
        let started = self.finish_next().await.unwrap_or_else(|e| {
            error!(error = %format!("{:#}", e), "failed to claim started scan");
            CycleOutcome::Idle
        });
        (queued, started)
    }

    /// Claims the oldest queued scan and dispatches its jobs.
    ///
    /// # Errors
    /// Only claim or release failures surface; anything that goes wrong
    /// while dispatching fails the scan instead.
    pub async fn start_next(&self) -> Result<CycleOutcome> {
        let Some(scan) = self.claim(ScanStatus::Queued)? else {
            return Ok(CycleOutcome::Idle);
        };
        let id = scan.id;
        let outcome = match self.start(scan.clone()).await {
            Ok(outcome) => outcome,
            Err(e) if is_lease_lost(&e) => self.yielded(id),
            Err(e) => self.fail(scan, ScanStatus::Queued, &e),
        };
        self.store.release_scan(id, &self.settings.worker_id)?;
        Ok(outcome)
    }

    /// Claims the oldest started scan and checks whether its jobs finished.
    ///
    /// # Errors
    /// Only claim or release failures surface; ingestion, backfill and
    /// scoring failures fail the scan instead.
    pub async fn finish_next(&self) -> Result<CycleOutcome> {
        let Some(scan) = self.claim(ScanStatus::Started)? else {
            return Ok(CycleOutcome::Idle);
        };
        let id = scan.id;
        let outcome = match self.finish(scan.clone()).await {
            Ok(outcome) => outcome,
            Err(e) if is_lease_lost(&e) => self.yielded(id),
            Err(e) => self.fail(scan, ScanStatus::Started, &e),
        };
        self.store.release_scan(id, &self.settings.worker_id)?;
        Ok(outcome)
    }

    fn claim(&self, status: ScanStatus) -> Result<Option<Scan>> {
        self.store.claim_next_scan(
            status,
            &self.settings.worker_id,
            self.clock.now(),
            self.settings.lease,
        )
    }

    /// Extends this worker's lease on `scan`.
    ///
    /// # Errors
    /// `ScanError::LeaseLost` once another worker has claimed the scan.
    fn heartbeat(&self, scan: &Scan) -> Result<()> {
        self.store.renew_lease(
            scan.id,
            &self.settings.worker_id,
            self.clock.now(),
            self.settings.lease,
        )
    }

    fn yielded(&self, scan_id: ScanId) -> CycleOutcome {
        warn!(
            scan = %scan_id,
            worker = %self.settings.worker_id,
            "lease lost; leaving scan to its new holder"
        );
        CycleOutcome::Yielded { scan_id }
    }

    #[instrument(skip_all, fields(scan = %scan.id))]
    async fn start(&self, mut scan: Scan) -> Result<CycleOutcome> {
        if let Some(abandoned) = self.abandon_if_canceled(&scan)? {
            return Ok(abandoned);
        }

        let specs = self.dispatcher.plan(&scan).await?;
        scan.job_names = specs.iter().map(|spec| spec.name.clone()).collect();
        let mut scan = match self.write(&scan, ScanStatus::Queued)? {
            Ok(stored) => stored,
            Err(abandoned) => return Ok(abandoned),
        };

        let results = self.dispatcher.submit_all(&specs).await;
        for (name, result) in results {
            match result {
                Ok(job_id) => debug!(job = %name, %job_id, "job accepted"),
                Err(e) => return Err(e),
            }
        }
        self.heartbeat(&scan)?;

        if let Some(abandoned) = self.abandon_if_canceled(&scan)? {
            return Ok(abandoned);
        }
        scan.transition(ScanStatus::Started, self.clock.now())?;
        if let Err(abandoned) = self.write(&scan, ScanStatus::Queued)? {
            return Ok(abandoned);
        }
        info!(jobs = scan.job_names.len(), "scan started");
        Ok(CycleOutcome::Advanced {
            scan_id: scan.id,
            status: ScanStatus::Started,
        })
    }

    #[instrument(skip_all, fields(scan = %scan.id))]
    async fn finish(&self, mut scan: Scan) -> Result<CycleOutcome> {
        if let Some(abandoned) = self.abandon_if_canceled(&scan)? {
            return Ok(abandoned);
        }
        if scan.job_names.is_empty() {
            return Err(ScanError::Validation {
                message: format!("{} started without any jobs", scan.id),
            }
            .into());
        }

        let expected = scan.job_names.iter().collect::<BTreeSet<_>>().len();
        let completed = self.store.completed_job_count(&scan.job_names)?;
        let now = self.clock.now();

        if completed < expected {
            if scan.is_stale(now, self.settings.staleness) {
                warn!(completed, expected, "scan went stale waiting for job results");
                return Err(ScanError::Validation {
                    message: format!(
                        "{} of {} jobs reported before the staleness bound",
                        completed, expected
                    ),
                }
                .into());
            }
            debug!(completed, expected, "waiting for job results");
            return Ok(CycleOutcome::Waiting {
                scan_id: scan.id,
                completed,
                expected,
            });
        }

        let ingest = self.ingester.ingest_scan(&scan)?;
        self.heartbeat(&scan)?;
        self.backfill.backfill(self.language).await?;
        self.heartbeat(&scan)?;
        let graph_ids = self.affected_graphs(&scan, &ingest)?;
        let scoring: ScoreSummary =
            self.scorer
                .score_guarded(&graph_ids, self.clock.now(), || self.heartbeat(&scan))?;

        if let Some(abandoned) = self.abandon_if_canceled(&scan)? {
            return Ok(abandoned);
        }
        let status = if scoring.failed_graphs.is_empty() {
            ScanStatus::Succeeded
        } else {
            warn!(failed = scoring.failed_graphs.len(), "some graphs could not be scored");
            ScanStatus::Failed
        };
        scan.graph_ids = graph_ids;
        scan.transition(status, self.clock.now())?;
        if let Err(abandoned) = self.write(&scan, ScanStatus::Started)? {
            return Ok(abandoned);
        }
        info!(%status, reports = scoring.reports, "scan finished");
        Ok(CycleOutcome::Advanced {
            scan_id: scan.id,
            status,
        })
    }

    /// Graphs to score for `scan`.
    ///
    /// Package scans whose listings produced no graph fall back to the latest
    /// graph the package heads, then to a graph of the package alone.
    fn affected_graphs(&self, scan: &Scan, ingest: &IngestSummary) -> Result<Vec<GraphId>> {
        if !ingest.graph_ids.is_empty() {
            return Ok(ingest.graph_ids.clone());
        }

        let ScanTarget::Package {
            name,
            version: Some(version),
        } = &scan.target
        else {
            return Err(ScanError::EmptyGraph {
                graph: format!("{} produced no dependency graph", scan.id),
            }
            .into());
        };
        if version == LATEST_VERSION_TAG {
            return Err(ScanError::EmptyGraph {
                graph: format!("{} produced no dependency graph", scan.id),
            }
            .into());
        }

        let key = PackageVersionKey::new(name.as_str(), version.as_str(), self.language)?;
        let id = self
            .store
            .insert_package_version_if_absent(&key, &Provenance::default())?;
        if let Some(graph) = self.store.latest_graph_with_parent(id)? {
            return Ok(vec![graph.id]);
        }
        let graph = self.store.insert_graph_if_absent(NewPackageGraph {
            root_package_version_id: Some(id),
            link_ids: BTreeSet::new(),
            package_manager: self.package_manager,
            package_manager_version: None,
        })?;
        Ok(vec![graph.id])
    }

    /// Conditional write; a conflict caused by cancellation becomes
    /// [`CycleOutcome::Abandoned`].
    fn write(&self, scan: &Scan, expected: ScanStatus) -> Result<std::result::Result<Scan, CycleOutcome>> {
        match self
            .store
            .update_scan(scan, expected, &self.settings.worker_id)
        {
            Ok(stored) => Ok(Ok(stored)),
            Err(e) => match self.abandon_if_canceled(scan)? {
                Some(abandoned) => Ok(Err(abandoned)),
                None => Err(e),
            },
        }
    }

    fn abandon_if_canceled(&self, scan: &Scan) -> Result<Option<CycleOutcome>> {
        let current = self
            .store
            .scan(scan.id)?
            .ok_or(ScanError::ScanNotFound {
                scan_id: scan.id.value(),
            })?;
        if current.status == ScanStatus::Canceled {
            info!(scan = %scan.id, "scan was canceled; abandoning");
            return Ok(Some(CycleOutcome::Abandoned { scan_id: scan.id }));
        }
        Ok(None)
    }

    /// Moves `scan` to failed, logging `reason`.
    ///
    /// Only the stored copy's status and timestamp change; job names and
    /// graph ids recorded earlier are kept.
    fn fail(&self, scan: Scan, expected: ScanStatus, reason: &anyhow::Error) -> CycleOutcome {
        error!(scan = %scan.id, error = %format!("{:#}", reason), "scan failed");

        let mut current = match self.store.scan(scan.id) {
            Ok(Some(current)) => current,
            Ok(None) => return CycleOutcome::Idle,
            Err(e) => {
                error!(scan = %scan.id, error = %e, "could not reload failing scan");
                return CycleOutcome::Idle;
            }
        };
        if current.status == ScanStatus::Canceled {
            return CycleOutcome::Abandoned { scan_id: scan.id };
        }
        if let Err(e) = current.transition(ScanStatus::Failed, self.clock.now()) {
            error!(scan = %scan.id, error = %e, "could not mark scan failed");
            return CycleOutcome::Idle;
        }
        match self
            .store
            .update_scan(&current, expected, &self.settings.worker_id)
        {
            Ok(_) => CycleOutcome::Advanced {
                scan_id: scan.id,
                status: ScanStatus::Failed,
            },
            Err(e) => {
                error!(scan = %scan.id, error = %e, "could not persist failed status");
                CycleOutcome::Idle
            }
        }
    }
}

fn is_lease_lost(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ScanError>(),
        Some(ScanError::LeaseLost { .. })
    )
}
