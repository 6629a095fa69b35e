//! Envelope and listing builders shared by the integration tests.

use depwatch::risk_scoring::domain::{
    ResultEnvelope, TaskLine, TaskResult, JOB_NAME_ATTRIBUTE,
};
use std::collections::BTreeMap;

pub fn npm_task(name: &str, command: &str, stdout: &str) -> TaskResult {
    TaskResult {
        name: name.to_string(),
        command: command.to_string(),
        exit_code: Some(0),
        stdout: Some(stdout.to_string()),
        stderr: None,
        envvar_args: BTreeMap::from([("PACKAGE_MANAGER".to_string(), "npm".to_string())]),
    }
}

/// One completed job's envelope carrying the given task results.
pub fn envelope(message_id: &str, job_name: &str, tasks: Vec<TaskResult>) -> ResultEnvelope {
    let mut data: Vec<TaskLine> = tasks.into_iter().map(TaskLine::TaskResult).collect();
    data.push(TaskLine::TaskComplete);
    ResultEnvelope {
        message_id: message_id.to_string(),
        attributes: BTreeMap::from([(JOB_NAME_ATTRIBUTE.to_string(), job_name.to_string())]),
        data,
        publish_time: None,
    }
}

/// `npm list --json` for a -> b -> c
pub const CHAIN_LISTING: &str = r#"{
    "name": "a",
    "version": "1.0.0",
    "dependencies": {
        "b": {
            "version": "2.0.0",
            "dependencies": {
                "c": {"version": "3.0.0"}
            }
        }
    }
}"#;

/// `npm audit --json` with one critical advisory against b@2.0.0
pub const B_CRITICAL_AUDIT: &str = r#"{
    "advisories": {
        "1001": {
            "id": 1001,
            "module_name": "b",
            "severity": "critical",
            "title": "Prototype pollution in b",
            "url": "https://npmjs.com/advisories/1001",
            "cwe": "CWE-1321",
            "cves": ["CVE-2024-0001"],
            "vulnerable_versions": "<2.0.1",
            "patched_versions": ">=2.0.1",
            "findings": [{"version": "2.0.0", "paths": ["b"]}],
            "metadata": {"exploitability": 5}
        }
    }
}"#;

/// `npm list --json` with one edge p -> q
pub const PQ_LISTING: &str = r#"{
    "name": "p",
    "version": "1.0.0",
    "dependencies": {"q": {"version": "1.0.0"}}
}"#;

/// `cargo metadata --format-version 1` with app -> serde -> itoa
pub const CARGO_METADATA: &str = r#"{
    "packages": [
        {"id": "app 0.1.0 (path+file:///work)", "name": "app", "version": "0.1.0"},
        {"id": "serde 1.0.130 (registry+https://github.com/rust-lang/crates.io-index)", "name": "serde", "version": "1.0.130"},
        {"id": "itoa 1.0.1 (registry+https://github.com/rust-lang/crates.io-index)", "name": "itoa", "version": "1.0.1"}
    ],
    "resolve": {
        "root": "app 0.1.0 (path+file:///work)",
        "nodes": [
            {"id": "app 0.1.0 (path+file:///work)", "dependencies": ["serde 1.0.130 (registry+https://github.com/rust-lang/crates.io-index)"]},
            {"id": "serde 1.0.130 (registry+https://github.com/rust-lang/crates.io-index)", "dependencies": ["itoa 1.0.1 (registry+https://github.com/rust-lang/crates.io-index)"]},
            {"id": "itoa 1.0.1 (registry+https://github.com/rust-lang/crates.io-index)", "dependencies": []}
        ]
    }
}"#;

/// crates.io `/api/v1/crates/<name>` body with one published version
pub fn crate_response(name: &str, version: &str, downloads: u64) -> String {
    format!(
        r#"{{"crate":{{"name":"{name}","max_version":"{version}","downloads":{downloads},"recent_downloads":{recent}}},
            "versions":[{{"num":"{version}","created_at":"2021-06-01T00:00:00+00:00"}}]}}"#,
        recent = downloads / 10,
    )
}
