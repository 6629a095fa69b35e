use crate::ports::outbound::{
    AdvisoryRepository, JobResultRepository, PackageGraphRepository, ReportRepository,
    ScanRepository, SignalRepository,
};
use crate::risk_scoring::domain::{
    Advisory, AdvisoryFields, AdvisoryId, AdvisoryKey, DependencyLink, GraphId, Language, Lease,
    LinkId, NewPackageGraph, PackageGraph, PackageVersion, PackageVersionId, PackageVersionKey,
    Provenance, QualityScore, RegistryEntry, Report, ReportId, ResultEnvelope, ResultInbox, Scan,
    ScanId, ScanStatus, ScanTarget, ScoredPackage,
};
use crate::shared::error::ScanError;
use crate::shared::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

type RegistryKey = (String, String, Language);

#[derive(Debug, Default)]
struct GraphTables {
    package_versions: BTreeMap<PackageVersionId, PackageVersion>,
    package_version_index: HashMap<PackageVersionKey, PackageVersionId>,
    links: BTreeMap<LinkId, DependencyLink>,
    link_index: HashMap<(PackageVersionId, PackageVersionId), LinkId>,
    graphs: BTreeMap<GraphId, PackageGraph>,
}

#[derive(Debug, Default)]
struct AdvisoryTable {
    next_id: u64,
    rows: BTreeMap<AdvisoryKey, Advisory>,
}

#[derive(Debug, Default)]
struct ReportTable {
    rows: Vec<Report>,
}

#[derive(Debug, Default)]
struct ScanTable {
    rows: BTreeMap<ScanId, Scan>,
}

/// Process-local store implementing every repository port.
///
/// Tables that need multi-row atomicity (graphs, advisories, reports, scans
/// and the result inbox) sit behind a mutex each; signal tables are
/// concurrent maps. Ids are assigned sequentially from 1 per table.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    graphs: Mutex<GraphTables>,
    advisories: Mutex<AdvisoryTable>,
    reports: Mutex<ReportTable>,
    scans: Mutex<ScanTable>,
    inbox: Mutex<ResultInbox>,
    registry_entries: DashMap<RegistryKey, RegistryEntry>,
    quality_scores: DashMap<String, Vec<QualityScore>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, table: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow::anyhow!("{} table lock poisoned", table))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Package versions of one language, for missing-signal queries.
    fn package_versions_of(&self, language: Language) -> Result<Vec<PackageVersionKey>> {
        Ok(self
            .package_versions_in(language)?
            .into_iter()
            .map(|pv| pv.key)
            .collect())
    }
}

impl PackageGraphRepository for InMemoryStore {
    fn insert_package_version_if_absent(
        &self,
        key: &PackageVersionKey,
        provenance: &Provenance,
    ) -> Result<PackageVersionId> {
        let mut tables = lock(&self.graphs, "graph")?;
        if let Some(&id) = tables.package_version_index.get(key) {
            if let Some(existing) = tables.package_versions.get_mut(&id) {
                existing.provenance.fill_missing(provenance);
            }
            return Ok(id);
        }

        let id = PackageVersionId(tables.package_versions.len() as u64 + 1);
        tables.package_versions.insert(
            id,
            PackageVersion {
                id,
                key: key.clone(),
                provenance: provenance.clone(),
                inserted_at: Utc::now(),
            },
        );
        tables.package_version_index.insert(key.clone(), id);
        debug!(%id, package = %key, "inserted package version");
        Ok(id)
    }

    fn find_package_version(&self, key: &PackageVersionKey) -> Result<Option<PackageVersion>> {
        let tables = lock(&self.graphs, "graph")?;
        Ok(tables
            .package_version_index
            .get(key)
            .and_then(|id| tables.package_versions.get(id))
            .cloned())
    }

    fn package_versions(&self, ids: &BTreeSet<PackageVersionId>) -> Result<Vec<PackageVersion>> {
        let tables = lock(&self.graphs, "graph")?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.package_versions.get(id))
            .cloned()
            .collect())
    }

    fn package_versions_in(&self, language: Language) -> Result<Vec<PackageVersion>> {
        let tables = lock(&self.graphs, "graph")?;
        Ok(tables
            .package_versions
            .values()
            .filter(|pv| pv.language() == language)
            .cloned()
            .collect())
    }

    fn insert_link_if_absent(
        &self,
        parent: PackageVersionId,
        child: PackageVersionId,
    ) -> Result<LinkId> {
        let mut tables = lock(&self.graphs, "graph")?;
        if let Some(&id) = tables.link_index.get(&(parent, child)) {
            return Ok(id);
        }
        let id = LinkId(tables.links.len() as u64 + 1);
        tables.links.insert(
            id,
            DependencyLink {
                id,
                parent_id: parent,
                child_id: child,
            },
        );
        tables.link_index.insert((parent, child), id);
        Ok(id)
    }

    fn links(&self, ids: &BTreeSet<LinkId>) -> Result<Vec<DependencyLink>> {
        let tables = lock(&self.graphs, "graph")?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.links.get(id))
            .copied()
            .collect())
    }

    fn insert_graph_if_absent(&self, graph: NewPackageGraph) -> Result<PackageGraph> {
        let mut tables = lock(&self.graphs, "graph")?;
        if let Some(existing) = tables
            .graphs
            .values()
            .find(|stored| stored.same_resolution(&graph))
        {
            return Ok(existing.clone());
        }
        let id = GraphId(tables.graphs.len() as u64 + 1);
        let stored = PackageGraph::from_new(id, graph, Utc::now());
        tables.graphs.insert(id, stored.clone());
        debug!(%id, links = stored.link_ids.len(), "inserted package graph");
        Ok(stored)
    }

    fn graph(&self, id: GraphId) -> Result<Option<PackageGraph>> {
        let tables = lock(&self.graphs, "graph")?;
        Ok(tables.graphs.get(&id).cloned())
    }

    fn latest_graph_with_parent(&self, id: PackageVersionId) -> Result<Option<PackageGraph>> {
        let tables = lock(&self.graphs, "graph")?;
        Ok(tables
            .graphs
            .values()
            .rev()
            .find(|graph| {
                graph.link_ids.iter().any(|link_id| {
                    tables
                        .links
                        .get(link_id)
                        .map(|link| link.parent_id == id)
                        .unwrap_or(false)
                })
            })
            .cloned())
    }

    fn package_version_count(&self) -> Result<usize> {
        Ok(lock(&self.graphs, "graph")?.package_versions.len())
    }

    fn link_count(&self) -> Result<usize> {
        Ok(lock(&self.graphs, "graph")?.links.len())
    }
}

impl AdvisoryRepository for InMemoryStore {
    fn upsert_advisory(
        &self,
        key: AdvisoryKey,
        fields: AdvisoryFields,
        impacted: &BTreeSet<PackageVersionId>,
    ) -> Result<Advisory> {
        let mut table = lock(&self.advisories, "advisory")?;
        if let Some(existing) = table.rows.get_mut(&key) {
            existing.merge(fields, impacted);
            return Ok(existing.clone());
        }
        table.next_id += 1;
        let advisory = Advisory {
            id: AdvisoryId(table.next_id),
            key: key.clone(),
            fields,
            impacted_version_ids: impacted.clone(),
        };
        table.rows.insert(key, advisory.clone());
        Ok(advisory)
    }

    fn advisory(&self, key: &AdvisoryKey) -> Result<Option<Advisory>> {
        Ok(lock(&self.advisories, "advisory")?.rows.get(key).cloned())
    }

    fn advisories_impacting(&self, id: PackageVersionId) -> Result<Vec<Advisory>> {
        let table = lock(&self.advisories, "advisory")?;
        Ok(table
            .rows
            .values()
            .filter(|advisory| advisory.impacts(id))
            .cloned()
            .collect())
    }
}

impl SignalRepository for InMemoryStore {
    fn save_registry_entries(&self, entries: Vec<RegistryEntry>) -> Result<usize> {
        let count = entries.len();
        for entry in entries {
            let key = (
                entry.package_name.clone(),
                entry.package_version.clone(),
                entry.language,
            );
            self.registry_entries.insert(key, entry);
        }
        Ok(count)
    }

    fn registry_entry(
        &self,
        name: &str,
        version: &str,
        language: Language,
    ) -> Result<Option<RegistryEntry>> {
        let key = (name.to_string(), version.to_string(), language);
        Ok(self.registry_entries.get(&key).map(|entry| entry.clone()))
    }

    fn registry_entries_for(&self, name: &str, language: Language) -> Result<Vec<RegistryEntry>> {
        let mut entries: Vec<RegistryEntry> = self
            .registry_entries
            .iter()
            .filter(|item| item.key().0 == name && item.key().2 == language)
            .map(|item| item.value().clone())
            .collect();
        entries.sort_by(|a, b| a.package_version.cmp(&b.package_version));
        Ok(entries)
    }

    fn save_quality_scores(&self, scores: Vec<QualityScore>) -> Result<usize> {
        let count = scores.len();
        for score in scores {
            self.quality_scores
                .entry(score.package_name.clone())
                .or_default()
                .push(score);
        }
        Ok(count)
    }

    fn quality_score(&self, name: &str, version: &str) -> Result<Option<QualityScore>> {
        let Some(scores) = self.quality_scores.get(name) else {
            return Ok(None);
        };
        let exact = scores
            .iter()
            .rev()
            .find(|score| score.package_version.as_deref() == Some(version));
        Ok(exact.or_else(|| scores.last()).cloned())
    }

    fn package_names_missing_registry_entries(&self, language: Language) -> Result<Vec<String>> {
        let names: BTreeSet<String> = self
            .package_versions_of(language)?
            .into_iter()
            .filter(|key| {
                let registry_key = (key.name.clone(), key.version.clone(), language);
                !self.registry_entries.contains_key(&registry_key)
            })
            .map(|key| key.name)
            .collect();
        Ok(names.into_iter().collect())
    }

    fn package_names_missing_quality_scores(&self, language: Language) -> Result<Vec<String>> {
        let names: BTreeSet<String> = self
            .package_versions_of(language)?
            .into_iter()
            .filter(|key| !self.quality_scores.contains_key(&key.name))
            .map(|key| key.name)
            .collect();
        Ok(names.into_iter().collect())
    }
}

impl ReportRepository for InMemoryStore {
    fn save_reports(&self, scored: Vec<ScoredPackage>) -> Result<Vec<Report>> {
        let mut table = lock(&self.reports, "report")?;
        let first_id = table.rows.len() as u64 + 1;

        // Ids for the whole call first, so cycle members link to each other
        let saved_ids: HashMap<PackageVersionId, ReportId> = scored
            .iter()
            .enumerate()
            .map(|(offset, summary)| {
                (summary.package_version_id, ReportId(first_id + offset as u64))
            })
            .collect();

        let mut saved = Vec::with_capacity(scored.len());
        for (offset, summary) in scored.into_iter().enumerate() {
            let dependency_report_ids = summary
                .dependency_ids
                .iter()
                .filter_map(|dependency| {
                    let resolved = saved_ids.get(dependency).copied().or_else(|| {
                        table
                            .rows
                            .iter()
                            .rev()
                            .find(|report| report.summary.package_version_id == *dependency)
                            .map(|report| report.id)
                    });
                    if resolved.is_none() {
                        warn!(
                            package = %summary.package,
                            %dependency,
                            "dependency has no stored report to link"
                        );
                    }
                    resolved
                })
                .collect();
            saved.push(Report {
                id: ReportId(first_id + offset as u64),
                summary,
                dependency_report_ids,
            });
        }
        table.rows.extend(saved.iter().cloned());
        Ok(saved)
    }

    fn latest_report(
        &self,
        name: &str,
        version: &str,
        scored_after: Option<DateTime<Utc>>,
    ) -> Result<Option<Report>> {
        let table = lock(&self.reports, "report")?;
        Ok(table
            .rows
            .iter()
            .filter(|report| report.package() == name && report.version() == version)
            .filter(|report| {
                scored_after
                    .map(|after| report.summary.scoring_date > after)
                    .unwrap_or(true)
            })
            .max_by_key(|report| (report.summary.scoring_date, report.id))
            .cloned())
    }

    fn reports_for_graph(&self, graph_id: GraphId) -> Result<Vec<Report>> {
        let table = lock(&self.reports, "report")?;
        Ok(table
            .rows
            .iter()
            .filter(|report| report.summary.graph_id == Some(graph_id))
            .cloned()
            .collect())
    }
}

impl ScanRepository for InMemoryStore {
    fn create_scan(&self, target: ScanTarget, now: DateTime<Utc>) -> Result<Scan> {
        target.validate()?;
        let mut table = lock(&self.scans, "scan")?;
        let id = ScanId(table.rows.len() as u64 + 1);
        let scan = Scan::new(id, target, now);
        table.rows.insert(id, scan.clone());
        Ok(scan)
    }

    fn scan(&self, id: ScanId) -> Result<Option<Scan>> {
        Ok(lock(&self.scans, "scan")?.rows.get(&id).cloned())
    }

    fn claim_next_scan(
        &self,
        status: ScanStatus,
        holder: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<Scan>> {
        let mut table = lock(&self.scans, "scan")?;
        let candidate = table
            .rows
            .values_mut()
            .filter(|scan| scan.status == status && !scan.is_leased(now))
            .min_by_key(|scan| (scan.inserted_at, scan.id));
        Ok(candidate.map(|scan| {
            scan.lease = Some(Lease {
                holder: holder.to_string(),
                expires_at: now + lease,
            });
            scan.clone()
        }))
    }

    fn update_scan(&self, scan: &Scan, expected: ScanStatus, holder: &str) -> Result<Scan> {
        let mut table = lock(&self.scans, "scan")?;
        let stored = table
            .rows
            .get_mut(&scan.id)
            .ok_or(ScanError::ScanNotFound {
                scan_id: scan.id.value(),
            })?;

        let held = stored
            .lease
            .as_ref()
            .map(|lease| lease.holder == holder)
            .unwrap_or(false);
        if stored.status != expected || !held {
            return Err(ScanError::ScanConflict {
                scan_id: scan.id.value(),
                expected: expected.to_string(),
            }
            .into());
        }

        let lease = stored.lease.clone();
        *stored = scan.clone();
        stored.lease = lease;
        Ok(stored.clone())
    }

    fn renew_lease(
        &self,
        id: ScanId,
        holder: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<()> {
        let mut table = lock(&self.scans, "scan")?;
        let scan = table
            .rows
            .get_mut(&id)
            .ok_or(ScanError::ScanNotFound { scan_id: id.value() })?;
        match scan.lease.as_mut() {
            Some(held) if held.holder == holder => {
                held.expires_at = now + lease;
                Ok(())
            }
            _ => Err(ScanError::LeaseLost {
                scan_id: id.value(),
                holder: holder.to_string(),
            }
            .into()),
        }
    }

    fn release_scan(&self, id: ScanId, holder: &str) -> Result<()> {
        let mut table = lock(&self.scans, "scan")?;
        if let Some(scan) = table.rows.get_mut(&id) {
            if scan.lease.as_ref().map(|l| l.holder == holder).unwrap_or(false) {
                scan.lease = None;
            }
        }
        Ok(())
    }

    fn cancel_scan(&self, id: ScanId, now: DateTime<Utc>) -> Result<Scan> {
        let mut table = lock(&self.scans, "scan")?;
        let scan = table
            .rows
            .get_mut(&id)
            .ok_or(ScanError::ScanNotFound { scan_id: id.value() })?;
        scan.transition(ScanStatus::Canceled, now)?;
        Ok(scan.clone())
    }
}

impl JobResultRepository for InMemoryStore {
    fn apply_envelope(&self, envelope: ResultEnvelope) -> Result<bool> {
        let mut inbox = lock(&self.inbox, "result")?;
        let is_new = !inbox.contains(&envelope.message_id);
        let current = std::mem::take(&mut *inbox);
        *inbox = current.apply(envelope);
        Ok(is_new)
    }

    fn completed_job_count(&self, job_names: &[String]) -> Result<usize> {
        let inbox = lock(&self.inbox, "result")?;
        let distinct: HashSet<&String> = job_names.iter().collect();
        Ok(distinct
            .into_iter()
            .filter(|name| inbox.is_job_complete(name))
            .count())
    }

    fn envelopes_for_job(&self, job_name: &str) -> Result<Vec<ResultEnvelope>> {
        let inbox = lock(&self.inbox, "result")?;
        Ok(inbox.envelopes_for_job(job_name).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk_scoring::domain::{PackageManager, SeverityCounts, TaskLine};

    fn key(name: &str, version: &str) -> PackageVersionKey {
        PackageVersionKey::new(name, version, Language::Node).unwrap()
    }

    fn scored(id: PackageVersionId, dependencies: Vec<PackageVersionId>) -> ScoredPackage {
        ScoredPackage {
            package_version_id: id,
            package: format!("pkg-{}", id.value()),
            version: "1.0.0".to_string(),
            release_date: None,
            scoring_date: Utc::now(),
            quality_score: 0.5,
            quality_scored_version: None,
            direct: SeverityCounts::default(),
            indirect: SeverityCounts::default(),
            authors: None,
            contributors: None,
            immediate_deps: dependencies.len() as u32,
            all_deps: dependencies.len() as u32,
            graph_id: None,
            dependency_ids: dependencies,
        }
    }

    #[test]
    fn test_package_version_insert_is_idempotent_and_fills_provenance() {
        let store = InMemoryStore::new();
        let first = store
            .insert_package_version_if_absent(&key("a", "1.0.0"), &Provenance::default())
            .unwrap();
        let second = store
            .insert_package_version_if_absent(
                &key("a", "1.0.0"),
                &Provenance::with_url(Some("https://registry/a-1.0.0.tgz".to_string())),
            )
            .unwrap();
        let third = store
            .insert_package_version_if_absent(
                &key("a", "1.0.0"),
                &Provenance::with_url(Some("https://mirror/a.tgz".to_string())),
            )
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(store.package_version_count().unwrap(), 1);
        let stored = store.find_package_version(&key("a", "1.0.0")).unwrap().unwrap();
        assert_eq!(
            stored.provenance.url.as_deref(),
            Some("https://registry/a-1.0.0.tgz")
        );
    }

    #[test]
    fn test_links_and_graphs_are_deduplicated() {
        let store = InMemoryStore::new();
        let a = store
            .insert_package_version_if_absent(&key("a", "1"), &Provenance::default())
            .unwrap();
        let b = store
            .insert_package_version_if_absent(&key("b", "1"), &Provenance::default())
            .unwrap();
        let link = store.insert_link_if_absent(a, b).unwrap();
        assert_eq!(store.insert_link_if_absent(a, b).unwrap(), link);
        assert_ne!(store.insert_link_if_absent(b, a).unwrap(), link);

        let new_graph = NewPackageGraph {
            root_package_version_id: Some(a),
            link_ids: BTreeSet::from([link]),
            package_manager: PackageManager::Npm,
            package_manager_version: None,
        };
        let first = store.insert_graph_if_absent(new_graph.clone()).unwrap();
        let second = store.insert_graph_if_absent(new_graph).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.latest_graph_with_parent(a).unwrap().unwrap().id, first.id);

        let resolved = store.resolve_graph(first.id).unwrap();
        assert_eq!(resolved.node_ids(), BTreeSet::from([a, b]));
    }

    #[test]
    fn test_advisory_impacted_set_only_grows() {
        let store = InMemoryStore::new();
        let key = AdvisoryKey {
            language: Language::Node,
            source_id: "https://npmjs.com/advisories/1".to_string(),
        };
        let fields = AdvisoryFields {
            package_name: "x".to_string(),
            severity: Some("high".to_string()),
            ..AdvisoryFields::default()
        };
        store
            .upsert_advisory(
                key.clone(),
                fields.clone(),
                &BTreeSet::from([PackageVersionId(1), PackageVersionId(2)]),
            )
            .unwrap();
        let corrected = AdvisoryFields {
            severity: Some("critical".to_string()),
            ..fields
        };
        let merged = store
            .upsert_advisory(key, corrected, &BTreeSet::from([PackageVersionId(3)]))
            .unwrap();

        assert_eq!(merged.id, AdvisoryId(1));
        assert_eq!(merged.impacted_version_ids.len(), 3);
        assert_eq!(merged.fields.severity.as_deref(), Some("critical"));
        assert_eq!(store.advisories_impacting(PackageVersionId(2)).unwrap().len(), 1);
    }

    #[test]
    fn test_quality_score_falls_back_to_latest_for_package() {
        let store = InMemoryStore::new();
        let score = |version: Option<&str>, value: f64| QualityScore {
            package_name: "a".to_string(),
            package_version: version.map(str::to_string),
            score: value,
            quality: None,
            popularity: None,
            maintenance: None,
            analyzed_at: None,
        };
        store
            .save_quality_scores(vec![score(Some("1.0.0"), 0.4), score(Some("2.0.0"), 0.8)])
            .unwrap();

        assert_eq!(store.quality_score("a", "1.0.0").unwrap().unwrap().score, 0.4);
        assert_eq!(store.quality_score("a", "9.9.9").unwrap().unwrap().score, 0.8);
        assert!(store.quality_score("b", "1.0.0").unwrap().is_none());
    }

    #[test]
    fn test_missing_signal_queries() {
        let store = InMemoryStore::new();
        store
            .insert_package_version_if_absent(&key("a", "1.0.0"), &Provenance::default())
            .unwrap();
        store
            .insert_package_version_if_absent(&key("b", "1.0.0"), &Provenance::default())
            .unwrap();
        store
            .save_registry_entries(vec![RegistryEntry {
                package_name: "a".to_string(),
                package_version: "1.0.0".to_string(),
                language: Language::Node,
                published_at: None,
                maintainers: None,
                contributors: None,
                tarball: None,
                git_head: None,
                repository_url: None,
            }])
            .unwrap();

        assert_eq!(
            store.package_names_missing_registry_entries(Language::Node).unwrap(),
            vec!["b".to_string()]
        );
        assert_eq!(
            store.package_names_missing_quality_scores(Language::Node).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(store
            .package_names_missing_quality_scores(Language::Rust)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_save_reports_links_dependencies_within_batch() {
        let store = InMemoryStore::new();
        let saved = store
            .save_reports(vec![
                scored(PackageVersionId(2), vec![]),
                scored(PackageVersionId(1), vec![PackageVersionId(2)]),
            ])
            .unwrap();
        assert_eq!(saved[1].dependency_report_ids, vec![saved[0].id]);

        let later = store
            .save_reports(vec![scored(PackageVersionId(3), vec![PackageVersionId(2)])])
            .unwrap();
        assert_eq!(later[0].dependency_report_ids, vec![saved[0].id]);
        assert!(store.latest_report("pkg-1", "1.0.0", None).unwrap().is_some());
    }

    #[test]
    fn test_cycle_members_link_to_reports_from_the_same_save() {
        let store = InMemoryStore::new();
        let stale = store
            .save_reports(vec![scored(PackageVersionId(2), vec![])])
            .unwrap();

        let saved = store
            .save_reports(vec![
                scored(PackageVersionId(1), vec![PackageVersionId(2)]),
                scored(PackageVersionId(2), vec![PackageVersionId(1)]),
            ])
            .unwrap();

        assert_eq!(saved[0].dependency_report_ids, vec![saved[1].id]);
        assert_ne!(saved[0].dependency_report_ids, vec![stale[0].id]);
        assert_eq!(saved[1].dependency_report_ids, vec![saved[0].id]);
    }

    #[test]
    fn test_claim_lease_and_conditional_update() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let target = ScanTarget::Package {
            name: "lodash".to_string(),
            version: None,
        };
        let created = store.create_scan(target, now).unwrap();

        let claimed = store
            .claim_next_scan(ScanStatus::Queued, "w1", now, Duration::seconds(60))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, created.id);
        assert_eq!(claimed.updated_at, created.updated_at);
        assert!(store
            .claim_next_scan(ScanStatus::Queued, "w2", now, Duration::seconds(60))
            .unwrap()
            .is_none());

        let mut next = claimed.clone();
        next.transition(ScanStatus::Started, now).unwrap();
        assert!(store.update_scan(&next, ScanStatus::Queued, "w2").is_err());
        store.update_scan(&next, ScanStatus::Queued, "w1").unwrap();
        let conflict = store.update_scan(&next, ScanStatus::Queued, "w1").unwrap_err();
        assert!(conflict.to_string().contains("modified concurrently"));

        store.release_scan(created.id, "w1").unwrap();
        assert!(store.scan(created.id).unwrap().unwrap().lease.is_none());
    }

    #[test]
    fn test_renew_lease_fails_once_another_worker_claims() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let scan = store
            .create_scan(
                ScanTarget::Package {
                    name: "lodash".to_string(),
                    version: None,
                },
                now,
            )
            .unwrap();
        let lease = Duration::seconds(60);
        store
            .claim_next_scan(ScanStatus::Queued, "w1", now, lease)
            .unwrap()
            .unwrap();

        let later = now + Duration::seconds(45);
        store.renew_lease(scan.id, "w1", later, lease).unwrap();
        assert!(store
            .claim_next_scan(ScanStatus::Queued, "w2", now + Duration::seconds(90), lease)
            .unwrap()
            .is_none());

        let expired = later + Duration::seconds(61);
        store
            .claim_next_scan(ScanStatus::Queued, "w2", expired, lease)
            .unwrap()
            .unwrap();
        let lost = store.renew_lease(scan.id, "w1", expired, lease).unwrap_err();
        assert!(matches!(
            lost.downcast_ref::<ScanError>(),
            Some(ScanError::LeaseLost { .. })
        ));

        store.release_scan(scan.id, "w2").unwrap();
        assert!(store.renew_lease(scan.id, "w2", expired, lease).is_err());
    }

    #[test]
    fn test_cancel_refuses_terminal_scans() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let scan = store
            .create_scan(
                ScanTarget::Package {
                    name: "a".to_string(),
                    version: None,
                },
                now,
            )
            .unwrap();
        assert_eq!(
            store.cancel_scan(scan.id, now).unwrap().status,
            ScanStatus::Canceled
        );
        assert!(store.cancel_scan(scan.id, now).is_err());
    }

    #[test]
    fn test_apply_envelope_detects_redelivery() {
        let store = InMemoryStore::new();
        let envelope = ResultEnvelope {
            message_id: "m1".to_string(),
            attributes: BTreeMap::from([("JOB_NAME".to_string(), "job-a".to_string())]),
            data: vec![TaskLine::TaskComplete],
            publish_time: None,
        };
        assert!(store.apply_envelope(envelope.clone()).unwrap());
        assert!(!store.apply_envelope(envelope).unwrap());
        assert_eq!(
            store
                .completed_job_count(&["job-a".to_string(), "job-b".to_string()])
                .unwrap(),
            1
        );
        assert_eq!(store.envelopes_for_job("job-a").unwrap().len(), 1);
    }
}
