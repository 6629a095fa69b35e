//! Task output parsers.
//!
//! Dispatch is a fixed table keyed by (package manager, task kind); every
//! entry is a pure function from raw stdout to [`ParsedTaskOutput`].

mod cargo;
mod npm;
mod yarn;

use crate::application::dto::ParsedTaskOutput;
use crate::risk_scoring::domain::{PackageManager, TaskResult};
use crate::shared::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use tracing::warn;

/// Kind of task a sandbox job runs, taken from the task name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Install,
    ListMetadata,
    Audit,
}

impl TaskKind {
    pub fn from_task_name(name: &str) -> Option<Self> {
        match name {
            "install" => Some(TaskKind::Install),
            "list_metadata" => Some(TaskKind::ListMetadata),
            "audit" => Some(TaskKind::Audit),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Install => "install",
            TaskKind::ListMetadata => "list_metadata",
            TaskKind::Audit => "audit",
        };
        f.write_str(name)
    }
}

pub type ParseFn = fn(&str) -> Result<ParsedTaskOutput>;

const PARSERS: &[(PackageManager, TaskKind, ParseFn)] = &[
    (PackageManager::Npm, TaskKind::Install, parse_nothing),
    (PackageManager::Npm, TaskKind::ListMetadata, npm::parse_list),
    (PackageManager::Npm, TaskKind::Audit, npm::parse_audit),
    (PackageManager::Yarn, TaskKind::Install, parse_nothing),
    (PackageManager::Yarn, TaskKind::ListMetadata, yarn::parse_list),
    (PackageManager::Yarn, TaskKind::Audit, yarn::parse_audit),
    (PackageManager::Cargo, TaskKind::Install, parse_nothing),
    (PackageManager::Cargo, TaskKind::ListMetadata, cargo::parse_metadata),
    (PackageManager::Cargo, TaskKind::Audit, cargo::parse_audit),
];

/// Looks up the parser for a (package manager, task kind) pair.
pub fn parser_for(package_manager: PackageManager, kind: TaskKind) -> Option<ParseFn> {
    PARSERS
        .iter()
        .find(|(pm, k, _)| *pm == package_manager && *k == kind)
        .map(|(_, _, parse)| *parse)
}

/// Env arg naming the package manager a job ran with.
pub const PACKAGE_MANAGER_ENV: &str = "PACKAGE_MANAGER";

/// Env arg carrying the package manager's version, when the job reports it.
pub const PACKAGE_MANAGER_VERSION_ENV: &str = "PACKAGE_MANAGER_VERSION";

/// Parses one task result.
///
/// # Returns
/// The package manager the task ran with and its parsed output, or
/// `Ok(None)` when the task name or package manager is not recognized, or
/// the task printed nothing. Skips are logged.
///
/// # Errors
/// Returns an error when a recognized task's stdout cannot be parsed.
pub fn parse_task(result: &TaskResult) -> Result<Option<(PackageManager, ParsedTaskOutput)>> {
    let Some(kind) = TaskKind::from_task_name(&result.name) else {
        warn!(task = %result.name, "skipping task with unrecognized name");
        return Ok(None);
    };

    let package_manager = result
        .envvar_args
        .get(PACKAGE_MANAGER_ENV)
        .and_then(|pm| pm.parse::<PackageManager>().ok())
        .or_else(|| PackageManager::from_command(&result.command));
    let Some(package_manager) = package_manager else {
        warn!(task = %result.name, command = %result.command, "skipping task from unknown package manager");
        return Ok(None);
    };

    let Some(parse) = parser_for(package_manager, kind) else {
        warn!(task = %kind, %package_manager, "no parser registered");
        return Ok(None);
    };

    let stdout = result.stdout.as_deref().unwrap_or("").trim();
    if stdout.is_empty() {
        if kind != TaskKind::Install {
            warn!(task = %kind, %package_manager, exit_code = ?result.exit_code, "task printed no output");
        }
        return Ok(None);
    }

    let mut parsed = parse(stdout)?;
    if let ParsedTaskOutput::Dependencies(listing) = &mut parsed {
        if listing.package_manager_version.is_none() {
            listing.package_manager_version =
                result.envvar_args.get(PACKAGE_MANAGER_VERSION_ENV).cloned();
        }
    }
    Ok(Some((package_manager, parsed)))
}

fn parse_nothing(_stdout: &str) -> Result<ParsedTaskOutput> {
    Ok(ParsedTaskOutput::Nothing)
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Splits `name@version`, keeping the leading `@` of scoped names.
pub(crate) fn split_name_version(spec: &str) -> Option<(&str, &str)> {
    let (scope_offset, rest) = match spec.strip_prefix('@') {
        Some(rest) => (1, rest),
        None => (0, spec),
    };
    let at = rest.rfind('@')?;
    let name = &spec[..scope_offset + at];
    let version = &rest[at + 1..];
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(name: &str, command: &str, stdout: &str) -> TaskResult {
        TaskResult {
            name: name.to_string(),
            command: command.to_string(),
            exit_code: Some(0),
            stdout: Some(stdout.to_string()),
            stderr: None,
            envvar_args: BTreeMap::new(),
        }
    }

    #[test]
    fn test_table_covers_every_pair() {
        for pm in [PackageManager::Npm, PackageManager::Yarn, PackageManager::Cargo] {
            for kind in [TaskKind::Install, TaskKind::ListMetadata, TaskKind::Audit] {
                assert!(parser_for(pm, kind).is_some(), "{} {}", pm, kind);
            }
        }
    }

    #[test]
    fn test_unrecognized_task_name_is_skipped() {
        let result = parse_task(&task("lint", "npm run lint", "ok")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unknown_package_manager_is_skipped() {
        let result = parse_task(&task("list_metadata", "pip list --format json", "[]")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_env_arg_overrides_command() {
        let mut result = task(
            "list_metadata",
            "sh -c 'yarn list --json'",
            r#"{"type":"tree","data":{"type":"list","trees":[]}}"#,
        );
        result
            .envvar_args
            .insert(PACKAGE_MANAGER_ENV.to_string(), "yarn".to_string());
        result
            .envvar_args
            .insert(PACKAGE_MANAGER_VERSION_ENV.to_string(), "1.22.19".to_string());

        match parse_task(&result).unwrap() {
            Some((PackageManager::Yarn, ParsedTaskOutput::Dependencies(listing))) => {
                assert_eq!(listing.package_manager, PackageManager::Yarn);
                assert_eq!(listing.package_manager_version.as_deref(), Some("1.22.19"));
            }
            other => panic!("unexpected parse result: {:?}", other),
        }
    }

    #[test]
    fn test_install_task_parses_to_nothing() {
        let result = parse_task(&task("install", "npm install --save=true", "added 3 packages")).unwrap();
        assert_eq!(result, Some((PackageManager::Npm, ParsedTaskOutput::Nothing)));
    }

    #[test]
    fn test_malformed_list_output_is_an_error() {
        assert!(parse_task(&task("list_metadata", "npm list --json", "{not json")).is_err());
    }

    #[test]
    fn test_split_name_version() {
        assert_eq!(split_name_version("left-pad@1.3.0"), Some(("left-pad", "1.3.0")));
        assert_eq!(
            split_name_version("@babel/core@7.8.3"),
            Some(("@babel/core", "7.8.3"))
        );
        assert_eq!(split_name_version("@babel/core"), None);
        assert_eq!(split_name_version("no-version"), None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2020-01-28T19:35:02.470Z").is_some());
        assert!(parse_timestamp("2020-11-18").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
