//! `yarn list --json` and `yarn audit --json` (yarn v1 JSON lines).

use super::npm::NpmAdvisory;
use super::split_name_version;
use crate::application::dto::{DependencyListing, PackageRef, ParsedAdvisory, ParsedTaskOutput};
use crate::risk_scoring::domain::PackageManager;
use crate::shared::Result;
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct TreeData {
    #[serde(default)]
    trees: Vec<TreeNode>,
}

#[derive(Debug, Deserialize)]
struct TreeNode {
    name: String,
    #[serde(default)]
    children: Vec<TreeNode>,
    /// Set on children that only reference a hoisted package by range
    #[serde(default)]
    shadow: bool,
}

#[derive(Debug, Deserialize)]
struct AuditAdvisoryData {
    advisory: NpmAdvisory,
}

fn lines(stdout: &str) -> impl Iterator<Item = Result<Line>> + '_ {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(number, line)| {
            serde_json::from_str::<Line>(line)
                .with_context(|| format!("yarn output line {} is not valid JSON", number + 1))
        })
}

/// Parses `yarn list --json`.
///
/// Top-level trees carry exact versions. Shadow children carry a range and
/// are resolved against the hoisted top-level version of the same name.
pub(super) fn parse_list(stdout: &str) -> Result<ParsedTaskOutput> {
    let mut trees: Vec<TreeNode> = Vec::new();
    for line in lines(stdout) {
        let line = line?;
        if line.kind != "tree" {
            continue;
        }
        let data: TreeData =
            serde_json::from_value(line.data).context("yarn tree line has an unexpected shape")?;
        trees.extend(data.trees);
    }

    let mut hoisted: HashMap<String, String> = HashMap::new();
    for tree in &trees {
        if let Some((name, version)) = split_name_version(&tree.name) {
            hoisted
                .entry(name.to_string())
                .or_insert_with(|| version.to_string());
        }
    }

    let mut listing = DependencyListing::new(PackageManager::Yarn);
    let mut stack: Vec<&TreeNode> = trees.iter().collect();

    while let Some(node) = stack.pop() {
        let Some((name, version)) = split_name_version(&node.name) else {
            warn!(entry = %node.name, "skipping yarn tree entry without a version");
            continue;
        };
        let parent = PackageRef::new(name, version);

        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let Some((child_name, child_version)) = split_name_version(&child.name) else {
                warn!(entry = %child.name, "skipping yarn child without a version");
                continue;
            };
            if child.shadow {
                match hoisted.get(child_name) {
                    Some(resolved) => children.push(PackageRef::new(child_name, resolved.as_str())),
                    None => warn!(
                        parent = %parent.name,
                        package = %child_name,
                        range = %child_version,
                        "no hoisted version for shadow dependency"
                    ),
                }
            } else {
                children.push(PackageRef::new(child_name, child_version));
                stack.push(child);
            }
        }

        if !children.is_empty() {
            listing.edges.push((parent, children));
        }
    }

    debug!(edges = listing.edges.len(), "parsed yarn dependency listing");
    Ok(ParsedTaskOutput::Dependencies(listing))
}

/// Parses `yarn audit --json`.
///
/// Yarn repeats an advisory once per resolution path; repeats are merged
/// and their impacted versions unioned.
pub(super) fn parse_audit(stdout: &str) -> Result<ParsedTaskOutput> {
    let mut merged: BTreeMap<String, ParsedAdvisory> = BTreeMap::new();

    for line in lines(stdout) {
        let line = line?;
        if line.kind != "auditAdvisory" {
            continue;
        }
        let data: AuditAdvisoryData = serde_json::from_value(line.data)
            .context("yarn auditAdvisory line has an unexpected shape")?;
        let Some(parsed) = data.advisory.into_parsed() else {
            continue;
        };
        match merged.get_mut(&parsed.source_id) {
            Some(existing) => existing.impacted_versions.extend(parsed.impacted_versions),
            None => {
                merged.insert(parsed.source_id.clone(), parsed);
            }
        }
    }

    Ok(ParsedTaskOutput::Advisories(merged.into_values().collect()))
}
