//! `npm list --json` and `npm audit --json` output.

use super::parse_timestamp;
use crate::application::dto::{DependencyListing, PackageRef, ParsedAdvisory, ParsedTaskOutput};
use crate::risk_scoring::domain::{parse_cwe, AdvisoryFields, PackageManager};
use crate::shared::Result;
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ListNode {
    name: Option<String>,
    version: Option<String>,
    resolved: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, ListNode>,
}

fn node_ref(name: &str, node: &ListNode) -> Option<PackageRef> {
    let version = node.version.as_deref()?;
    Some(PackageRef::new(name, version).with_url(node.resolved.clone()))
}

/// Parses an `npm list --json` tree.
///
/// The top object is the root when it carries both name and version. A
/// nameless project with exactly one top-level dependency is rooted at that
/// dependency. Anything else has no root.
pub(super) fn parse_list(stdout: &str) -> Result<ParsedTaskOutput> {
    let tree: ListNode =
        serde_json::from_str(stdout).context("npm list output is not valid JSON")?;
    let mut listing = DependencyListing::new(PackageManager::Npm);

    let top = match (&tree.name, &tree.version) {
        (Some(name), Some(version)) => {
            Some(PackageRef::new(name.as_str(), version.as_str()).with_url(tree.resolved.clone()))
        }
        _ => None,
    };

    let mut stack: Vec<(PackageRef, &ListNode)> = Vec::new();
    match top {
        Some(root) => {
            listing.root = Some(root.clone());
            stack.push((root, &tree));
        }
        None => {
            if tree.dependencies.len() == 1 {
                listing.root = tree
                    .dependencies
                    .iter()
                    .next()
                    .and_then(|(name, node)| node_ref(name, node));
            }
            for (name, node) in &tree.dependencies {
                match node_ref(name, node) {
                    Some(package) => stack.push((package, node)),
                    None => warn!(package = %name, "skipping top-level dependency without a version"),
                }
            }
        }
    }

    while let Some((parent, node)) = stack.pop() {
        let mut children = Vec::with_capacity(node.dependencies.len());
        for (name, child) in &node.dependencies {
            match node_ref(name, child) {
                Some(package) => {
                    children.push(package.clone());
                    stack.push((package, child));
                }
                None => warn!(
                    parent = %parent.name,
                    package = %name,
                    "skipping dependency without a resolved version"
                ),
            }
        }
        if !children.is_empty() {
            listing.edges.push((parent, children));
        }
    }

    debug!(edges = listing.edges.len(), "parsed npm dependency listing");
    Ok(ParsedTaskOutput::Dependencies(listing))
}

#[derive(Debug, Deserialize)]
struct AuditReport {
    #[serde(default)]
    advisories: BTreeMap<String, NpmAdvisory>,
    #[serde(rename = "auditReportVersion")]
    audit_report_version: Option<u32>,
}

/// Advisory object shared by `npm audit` v6 and `yarn audit`.
#[derive(Debug, Deserialize)]
pub(super) struct NpmAdvisory {
    id: Option<Value>,
    module_name: String,
    severity: Option<String>,
    title: Option<String>,
    url: Option<String>,
    #[serde(default)]
    cwe: Value,
    #[serde(default)]
    cves: Vec<String>,
    vulnerable_versions: Option<String>,
    patched_versions: Option<String>,
    #[serde(default)]
    findings: Vec<Finding>,
    created: Option<String>,
    updated: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Finding {
    version: String,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    exploitability: Option<i32>,
}

impl NpmAdvisory {
    fn source_id(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().filter(|url| !url.is_empty()) {
            return Some(url.to_string());
        }
        match &self.id {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    fn cwe(&self) -> Option<u32> {
        match &self.cwe {
            Value::String(raw) => parse_cwe(raw),
            Value::Array(items) => items.iter().filter_map(Value::as_str).find_map(parse_cwe),
            _ => None,
        }
    }

    pub(super) fn into_parsed(self) -> Option<ParsedAdvisory> {
        let Some(source_id) = self.source_id() else {
            warn!(package = %self.module_name, "skipping advisory without url or id");
            return None;
        };
        let cwe = self.cwe();
        let impacted_versions: BTreeSet<String> =
            self.findings.into_iter().map(|finding| finding.version).collect();

        Some(ParsedAdvisory {
            source_id,
            fields: AdvisoryFields {
                package_name: self.module_name,
                severity: self.severity,
                title: self.title,
                url: self.url,
                cwe,
                cves: self.cves,
                vulnerable_versions: self.vulnerable_versions,
                patched_versions: self.patched_versions,
                exploitability: self.metadata.and_then(|m| m.exploitability),
                created: self.created.as_deref().and_then(parse_timestamp),
                updated: self.updated.as_deref().and_then(parse_timestamp),
            },
            impacted_versions,
        })
    }
}

/// Parses an `npm audit --json` report (advisories keyed by id).
pub(super) fn parse_audit(stdout: &str) -> Result<ParsedTaskOutput> {
    let report: AuditReport =
        serde_json::from_str(stdout).context("npm audit output is not valid JSON")?;

    if report.advisories.is_empty() && report.audit_report_version.unwrap_or(1) >= 2 {
        warn!(
            version = ?report.audit_report_version,
            "npm audit report lists no per-version findings; no advisories recorded"
        );
    }

    let advisories = report
        .advisories
        .into_values()
        .filter_map(NpmAdvisory::into_parsed)
        .collect();
    Ok(ParsedTaskOutput::Advisories(advisories))
}
