//! `cargo metadata` and `cargo audit --json` output.

use super::parse_timestamp;
use crate::application::dto::{DependencyListing, PackageRef, ParsedAdvisory, ParsedTaskOutput};
use crate::risk_scoring::domain::{AdvisoryFields, PackageManager};
use crate::shared::Result;
use anyhow::Context;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

const RUSTSEC_ADVISORY_BASE: &str = "https://rustsec.org/advisories/";

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    packages: Vec<MetadataPackage>,
    resolve: Option<Resolve>,
}

#[derive(Debug, Deserialize)]
struct MetadataPackage {
    id: String,
    name: String,
    version: String,
    repository: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resolve {
    root: Option<String>,
    #[serde(default)]
    nodes: Vec<ResolveNode>,
}

#[derive(Debug, Deserialize)]
struct ResolveNode {
    id: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

/// Parses `cargo metadata --format-version 1`.
pub(super) fn parse_metadata(stdout: &str) -> Result<ParsedTaskOutput> {
    let metadata: Metadata =
        serde_json::from_str(stdout).context("cargo metadata output is not valid JSON")?;

    let packages: HashMap<&str, PackageRef> = metadata
        .packages
        .iter()
        .map(|package| {
            (
                package.id.as_str(),
                PackageRef::new(package.name.as_str(), package.version.as_str())
                    .with_url(package.repository.clone()),
            )
        })
        .collect();

    let mut listing = DependencyListing::new(PackageManager::Cargo);
    let Some(resolve) = metadata.resolve else {
        warn!("cargo metadata has no resolve section; run without --no-deps");
        return Ok(ParsedTaskOutput::Dependencies(listing));
    };

    listing.root = resolve
        .root
        .as_deref()
        .and_then(|root| packages.get(root))
        .cloned();

    for node in &resolve.nodes {
        let Some(parent) = packages.get(node.id.as_str()) else {
            warn!(id = %node.id, "resolve node names an unknown package");
            continue;
        };
        let children: Vec<PackageRef> = node
            .dependencies
            .iter()
            .filter_map(|id| {
                let child = packages.get(id.as_str()).cloned();
                if child.is_none() {
                    warn!(parent = %parent.name, id = %id, "dependency names an unknown package");
                }
                child
            })
            .collect();
        if !children.is_empty() {
            listing.edges.push((parent.clone(), children));
        }
    }

    Ok(ParsedTaskOutput::Dependencies(listing))
}

#[derive(Debug, Deserialize)]
struct AuditReport {
    vulnerabilities: Vulnerabilities,
}

#[derive(Debug, Deserialize)]
struct Vulnerabilities {
    #[serde(default)]
    list: Vec<Vulnerability>,
}

#[derive(Debug, Deserialize)]
struct Vulnerability {
    advisory: RustsecAdvisory,
    package: AffectedPackage,
    versions: Option<Versions>,
}

#[derive(Debug, Deserialize)]
struct RustsecAdvisory {
    id: String,
    package: String,
    title: Option<String>,
    url: Option<String>,
    date: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AffectedPackage {
    version: String,
}

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(default)]
    patched: Vec<String>,
}

/// Parses `cargo audit --json`.
///
/// RustSec entries carry no severity label, so the advisories are stored
/// without one and do not count toward severity buckets.
pub(super) fn parse_audit(stdout: &str) -> Result<ParsedTaskOutput> {
    let report: AuditReport =
        serde_json::from_str(stdout).context("cargo audit output is not valid JSON")?;

    let mut advisories: Vec<ParsedAdvisory> = Vec::new();
    for vulnerability in report.vulnerabilities.list {
        let advisory = vulnerability.advisory;
        let source_id = format!("{}{}", RUSTSEC_ADVISORY_BASE, advisory.id);

        if let Some(existing) = advisories.iter_mut().find(|a| a.source_id == source_id) {
            existing
                .impacted_versions
                .insert(vulnerability.package.version);
            continue;
        }

        let cves = advisory
            .aliases
            .iter()
            .filter(|alias| alias.starts_with("CVE-"))
            .cloned()
            .collect();
        let patched = vulnerability
            .versions
            .map(|versions| versions.patched.join(" || "))
            .filter(|patched| !patched.is_empty());

        advisories.push(ParsedAdvisory {
            source_id,
            fields: AdvisoryFields {
                package_name: advisory.package,
                severity: None,
                title: advisory.title,
                url: advisory.url,
                cwe: None,
                cves,
                vulnerable_versions: None,
                patched_versions: patched,
                exploitability: None,
                created: advisory.date.as_deref().and_then(parse_timestamp),
                updated: None,
            },
            impacted_versions: BTreeSet::from([vulnerability.package.version]),
        });
    }

    Ok(ParsedTaskOutput::Advisories(advisories))
}
