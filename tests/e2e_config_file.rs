/// End-to-end tests for config file discovery, validation and `check-config`.
///
/// These tests run the binary against config files in isolated temp
/// directories, using `assert_cmd` and `tempfile`.
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

/// Write a config file at the specified path.
fn write_config(path: &std::path::Path, content: &str) {
    fs::write(path, content).unwrap();
}

const FULL_CONFIG: &str = r#"
worker:
  poll_interval_secs: 2
  staleness_minutes: 30
  workers: 2
sandbox:
  submit_url: "https://sandbox.example.com/jobs"
  auth_token: "secret-token"
  image_name: "depwatch/job-runner:1.2.3"
  language: "node"
  package_manager: "yarn"
inbox:
  spool_dir: "results"
clients:
  npms_io:
    batch_size: 50
    delay_ms: 250
log_filter: "depwatch=debug"
"#;

// ============================================================================
// Auto-Discovery Tests
// ============================================================================

mod auto_discovery_tests {
    use super::*;

    #[test]
    fn test_check_config_without_file_prints_defaults() {
        let dir = TempDir::new().unwrap();

        cargo_bin_cmd!("depwatch")
            .current_dir(dir.path())
            .arg("check-config")
            .assert()
            .code(0)
            .stdout(predicate::str::contains("depwatch/job-runner:latest"))
            .stdout(predicate::str::contains("https://registry.npmjs.org/"))
            .stderr(predicate::str::contains("Configuration is valid"));
    }

    #[test]
    fn test_check_config_discovers_file_in_current_dir() {
        let dir = TempDir::new().unwrap();
        write_config(&dir.path().join("depwatch.config.yml"), FULL_CONFIG);

        cargo_bin_cmd!("depwatch")
            .current_dir(dir.path())
            .arg("check-config")
            .assert()
            .code(0)
            .stdout(predicate::str::contains("workers: 2"))
            .stdout(predicate::str::contains("package_manager: yarn"))
            .stdout(predicate::str::contains("batch_size: 50"));
    }

    #[test]
    fn test_check_config_never_prints_secrets() {
        let dir = TempDir::new().unwrap();
        write_config(&dir.path().join("depwatch.config.yml"), FULL_CONFIG);

        cargo_bin_cmd!("depwatch")
            .current_dir(dir.path())
            .arg("check-config")
            .assert()
            .code(0)
            .stdout(predicate::str::contains("secret-token").not());
    }
}

// ============================================================================
// Explicit Path Tests
// ============================================================================

mod explicit_path_tests {
    use super::*;

    #[test]
    fn test_explicit_config_path() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("custom.yml");
        write_config(&config_path, FULL_CONFIG);

        cargo_bin_cmd!("depwatch")
            .args(["check-config", "--config"])
            .arg(&config_path)
            .assert()
            .code(0)
            .stdout(predicate::str::contains("spool_dir: results"));
    }

    #[test]
    fn test_explicit_config_not_found() {
        let dir = TempDir::new().unwrap();

        cargo_bin_cmd!("depwatch")
            .args(["check-config", "--config"])
            .arg(dir.path().join("missing.yml"))
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Failed to read config file"));
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation_tests {
    use super::*;

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(&dir.path().join("depwatch.config.yml"), "worker: [unclosed");

        cargo_bin_cmd!("depwatch")
            .current_dir(dir.path())
            .arg("check-config")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Failed to parse config file"));
    }

    #[test]
    fn test_mismatched_package_manager_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir.path().join("depwatch.config.yml"),
            "sandbox:\n  language: rust\n  package_manager: npm\n",
        );

        cargo_bin_cmd!("depwatch")
            .current_dir(dir.path())
            .arg("check-config")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("does not belong to sandbox.language"));
    }

    #[test]
    fn test_staleness_shorter_than_poll_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir.path().join("depwatch.config.yml"),
            "worker:\n  poll_interval_secs: 120\n  staleness_minutes: 1\n",
        );

        cargo_bin_cmd!("depwatch")
            .current_dir(dir.path())
            .arg("check-config")
            .assert()
            .code(3)
            .stderr(predicate::str::contains("staleness_minutes"));
    }

    #[test]
    fn test_unknown_field_warns_but_succeeds() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir.path().join("depwatch.config.yml"),
            "unknown_option: true\n",
        );

        cargo_bin_cmd!("depwatch")
            .current_dir(dir.path())
            .arg("check-config")
            .assert()
            .code(0)
            .stderr(predicate::str::contains(
                "Unknown config field 'unknown_option' will be ignored",
            ));
    }
}
