//! Configuration file support for depwatch.
//!
//! Provides YAML-based configuration through `depwatch.config.yml` files,
//! including data structures, file loading, and validation. Every section
//! is optional and falls back to its defaults.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::adapters::outbound::network::{
    FetchSettings, DEFAULT_CRATES_IO_URL, DEFAULT_GITHUB_GRAPHQL_URL, DEFAULT_HIBP_URL,
    DEFAULT_NPMS_IO_URL, DEFAULT_NPM_REGISTRY_URL, MAX_GITHUB_PAGE_SIZE,
};
use crate::application::use_cases::{DispatchSettings, OrchestratorSettings};
use crate::risk_scoring::domain::{Language, PackageManager};
use crate::shared::Result;

pub const CONFIG_FILENAME: &str = "depwatch.config.yml";

/// Top-level configuration file schema.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub inbox: InboxConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Captures unknown fields for warnings.
    #[serde(flatten, skip_serializing)]
    pub unknown_fields: BTreeMap<String, serde_yaml_ng::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
    pub started_poll_interval_secs: u64,
    pub staleness_minutes: i64,
    pub lease_secs: i64,
    pub workers: usize,
    /// Prefix of the lease holder name; defaults to `depwatch-<pid>`
    pub worker_id: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            started_poll_interval_secs: 3,
            staleness_minutes: 15,
            lease_secs: 300,
            workers: 1,
            worker_id: None,
        }
    }
}

impl WorkerConfig {
    /// Orchestrator settings for the `index`-th worker of this process.
    pub fn orchestrator_settings(&self, index: usize) -> OrchestratorSettings {
        let prefix = self
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("depwatch-{}", std::process::id()));
        OrchestratorSettings {
            worker_id: format!("{}-{}", prefix, index),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            started_poll_interval: Duration::from_secs(self.started_poll_interval_secs),
            staleness: chrono::Duration::minutes(self.staleness_minutes),
            lease: chrono::Duration::seconds(self.lease_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub submit_url: Option<String>,
    pub image_name: String,
    pub namespace: String,
    pub backoff_limit: u32,
    pub language: String,
    pub package_manager: String,
    pub package_job_args: Vec<String>,
    pub dep_files_job_args: Vec<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            submit_url: None,
            image_name: "depwatch/job-runner:latest".to_string(),
            namespace: "default".to_string(),
            backoff_limit: 4,
            language: "node".to_string(),
            package_manager: "npm".to_string(),
            package_job_args: Vec::new(),
            dep_files_job_args: Vec::new(),
            auth_token: None,
        }
    }
}

impl SandboxConfig {
    pub fn package_manager(&self) -> Result<PackageManager> {
        PackageManager::from_str(&self.package_manager).map_err(|e| anyhow::anyhow!(e))
    }

    pub fn language(&self) -> Result<Language> {
        Language::from_str(&self.language).map_err(|e| anyhow::anyhow!(e))
    }

    pub fn dispatch_settings(&self) -> Result<DispatchSettings> {
        Ok(DispatchSettings {
            image_name: self.image_name.clone(),
            namespace: self.namespace.clone(),
            backoff_limit: self.backoff_limit,
            package_manager: self.package_manager()?,
            package_job_args: self.package_job_args.clone(),
            dep_files_job_args: self.dep_files_job_args.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    pub spool_dir: PathBuf,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("spool"),
        }
    }
}

/// Connection settings for one metadata endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub delay_ms: u64,
    pub max_connections: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: None,
            auth_token: None,
            delay_ms: 0,
            max_connections: 10,
            max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5_000,
            batch_size: 100,
            timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Resolved base URL, always ending in `/`.
    pub fn base_url(&self) -> String {
        let base = self.base_url.clone().unwrap_or_default();
        if base.ends_with('/') {
            base
        } else {
            format!("{}/", base)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            delay: Duration::from_millis(self.delay_ms),
            max_connections: self.max_connections,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
            batch_size: self.batch_size,
        }
    }

    fn fill_base_url(&mut self, default: &str) {
        if self.base_url.is_none() {
            self.base_url = Some(default.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientsConfig {
    pub npm_registry: ClientConfig,
    pub npms_io: ClientConfig,
    pub hibp: ClientConfig,
    pub crates_io: ClientConfig,
    /// GitHub advisory feed; `batch_size` is the page size and the feed
    /// stays off without an `auth_token`
    pub github: ClientConfig,
}

impl ClientsConfig {
    fn fill_default_urls(&mut self) {
        self.npm_registry.fill_base_url(DEFAULT_NPM_REGISTRY_URL);
        self.npms_io.fill_base_url(DEFAULT_NPMS_IO_URL);
        self.hibp.fill_base_url(DEFAULT_HIBP_URL);
        self.crates_io.fill_base_url(DEFAULT_CRATES_IO_URL);
        self.github.fill_base_url(DEFAULT_GITHUB_GRAPHQL_URL);
    }

    fn named(&self) -> [(&'static str, &ClientConfig); 5] {
        [
            ("npm_registry", &self.npm_registry),
            ("npms_io", &self.npms_io),
            ("hibp", &self.hibp),
            ("crates_io", &self.crates_io),
            ("github", &self.github),
        ]
    }
}

impl ConfigFile {
    /// Built-in defaults with endpoint URLs resolved.
    pub fn with_defaults() -> Self {
        let mut config = Self::default();
        config.clients.fill_default_urls();
        config
    }

    /// Effective configuration as YAML, with credentials left out.
    pub fn effective_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("Failed to render effective config")
    }
}

/// Load config from an explicit path. Returns an error if the file is not found.
pub fn load_config_from_path(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read config file: {}\n\n💡 Hint: Check that the file exists and is readable.",
            path.display()
        )
    })?;

    let mut config: ConfigFile = serde_yaml_ng::from_str(&content).with_context(|| {
        format!(
            "Failed to parse config file: {}\n\n💡 Hint: Ensure the file contains valid YAML syntax.",
            path.display()
        )
    })?;
    config.clients.fill_default_urls();

    validate_config(&config)?;
    warn_unknown_fields(&config);

    Ok(config)
}

/// Auto-discover config in a directory. Returns `None` silently if not found.
pub fn discover_config(dir: &Path) -> Result<Option<ConfigFile>> {
    let config_path = dir.join(CONFIG_FILENAME);

    if !config_path.exists() {
        return Ok(None);
    }

    let config = load_config_from_path(&config_path)?;
    Ok(Some(config))
}

/// Loads the explicit config, else the discovered one, else the defaults.
pub fn resolve_config(explicit: Option<&Path>, dir: &Path) -> Result<ConfigFile> {
    match explicit {
        Some(path) => load_config_from_path(path),
        None => Ok(discover_config(dir)?.unwrap_or_else(ConfigFile::with_defaults)),
    }
}

/// Validate the loaded configuration.
fn validate_config(config: &ConfigFile) -> Result<()> {
    let worker = &config.worker;
    if worker.workers == 0 {
        bail!(
            "Invalid config: worker.workers must be at least 1.\n\n\
             💡 Hint: Remove the field to run a single worker."
        );
    }
    if worker.poll_interval_secs == 0 || worker.started_poll_interval_secs == 0 {
        bail!("Invalid config: worker poll intervals must be at least 1 second.");
    }
    if worker.lease_secs <= 0 {
        bail!("Invalid config: worker.lease_secs must be positive.");
    }
    let poll = worker
        .poll_interval_secs
        .max(worker.started_poll_interval_secs);
    if worker.staleness_minutes.saturating_mul(60) < poll as i64 {
        bail!(
            "Invalid config: worker.staleness_minutes ({} min) is shorter than the poll interval ({} s).\n\n\
             💡 Hint: A started scan must get at least one poll before it can go stale.",
            worker.staleness_minutes,
            poll
        );
    }

    let package_manager = config.sandbox.package_manager()?;
    let language = config.sandbox.language()?;
    if package_manager.language() != language {
        bail!(
            "Invalid config: sandbox.package_manager '{}' does not belong to sandbox.language '{}'.",
            package_manager,
            language
        );
    }
    if config.sandbox.submit_url.as_deref().map(str::trim) == Some("") {
        bail!("Invalid config: sandbox.submit_url must not be empty.");
    }

    for (name, client) in config.clients.named() {
        if client.base_url.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            bail!(
                "Invalid config: clients.{}.base_url must not be empty.\n\n\
                 💡 Hint: Remove the field to use the public endpoint.",
                name
            );
        }
        if client.max_connections == 0 || client.batch_size == 0 {
            bail!(
                "Invalid config: clients.{}.max_connections and batch_size must be at least 1.",
                name
            );
        }
        if client.timeout_secs == 0 {
            bail!("Invalid config: clients.{}.timeout_secs must be at least 1.", name);
        }
    }
    if config.clients.github.batch_size > MAX_GITHUB_PAGE_SIZE {
        bail!(
            "Invalid config: clients.github.batch_size ({}) exceeds the GitHub page limit of {}.",
            config.clients.github.batch_size,
            MAX_GITHUB_PAGE_SIZE
        );
    }
    Ok(())
}

/// Warn about unknown fields in the config file.
fn warn_unknown_fields(config: &ConfigFile) {
    for key in config.unknown_fields.keys() {
        eprintln!(
            "⚠️  Warning: Unknown config field '{}' will be ignored.",
            key
        );
    }
}
