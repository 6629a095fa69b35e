use crate::risk_scoring::domain::{GraphId, ScanId, ScanStatus};

/// What one ingestion pass over a scan's results produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub graph_ids: Vec<GraphId>,
    pub advisories: usize,
    pub skipped_tasks: usize,
}

/// Counts from one signal backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub registry_entries: usize,
    pub quality_scores: usize,
    /// Feed advisories upserted
    pub advisories: usize,
    pub misses: usize,
    pub failures: usize,
}

/// Outcome of scoring a set of graphs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreSummary {
    pub reports: usize,
    pub skipped_nodes: usize,
    /// Graphs whose scoring aborted with a graph error
    pub failed_graphs: Vec<GraphId>,
}

impl ScoreSummary {
    pub fn is_complete(&self) -> bool {
        self.skipped_nodes == 0 && self.failed_graphs.is_empty()
    }
}

/// What a single orchestrator step did to a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No scan was available to claim
    Idle,
    /// Scan moved to a new status
    Advanced { scan_id: ScanId, status: ScanStatus },
    /// Scan is still waiting on job results
    Waiting {
        scan_id: ScanId,
        completed: usize,
        expected: usize,
    },
    /// Scan was canceled externally; polling abandoned
    Abandoned { scan_id: ScanId },
    /// Lease expired and another worker took the scan over
    Yielded { scan_id: ScanId },
}
