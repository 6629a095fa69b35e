use crate::ports::outbound::{JobSandbox, JobSpec, SignalRepository, SignalSource};
use crate::risk_scoring::domain::{
    Language, PackageManager, RegistryEntry, Scan, ScanTarget, LATEST_VERSION_TAG,
};
use crate::shared::error::ScanError;
use crate::shared::security::{is_release_version, validate_package_version};
use crate::shared::Result;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Sandbox settings applied to every job of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub image_name: String,
    pub namespace: String,
    pub backoff_limit: u32,
    pub package_manager: PackageManager,
    pub package_job_args: Vec<String>,
    pub dep_files_job_args: Vec<String>,
}

impl DispatchSettings {
    pub fn language(&self) -> Language {
        self.package_manager.language()
    }
}

/// JobDispatcher - plans the sandbox jobs of a scan and submits them
///
/// Package scans resolve their target versions from stored registry
/// metadata, fetching it first when none is stored yet.
pub struct JobDispatcher<S, J: ?Sized, F: ?Sized> {
    store: Arc<S>,
    sandbox: Arc<J>,
    source: Arc<F>,
    settings: DispatchSettings,
}

impl<S, J, F> JobDispatcher<S, J, F>
where
    S: SignalRepository,
    J: JobSandbox + ?Sized,
    F: SignalSource + ?Sized,
{
    pub fn new(store: Arc<S>, sandbox: Arc<J>, source: Arc<F>, settings: DispatchSettings) -> Self {
        Self {
            store,
            sandbox,
            source,
            settings,
        }
    }

    /// Builds the job specs for `scan`.
    ///
    /// # Errors
    /// Returns an error if the target is invalid or no version to scan can be
    /// resolved.
    #[instrument(skip_all, fields(scan = %scan.id))]
    pub async fn plan(&self, scan: &Scan) -> Result<Vec<JobSpec>> {
        scan.target.validate()?;

        match &scan.target {
            ScanTarget::Package { name, version } => {
                let versions = self.target_versions(name, version.as_deref()).await?;
                if versions.is_empty() {
                    return Err(ScanError::Validation {
                        message: format!("no release versions known for {}", name),
                    }
                    .into());
                }
                Ok(versions
                    .into_iter()
                    .map(|version| self.package_job(scan, name, &version))
                    .collect())
            }
            ScanTarget::DependencyFiles { urls } => {
                let name = Self::job_name(scan, "depfiles");
                let mut env = self.base_env(scan, &name);
                env.insert("DEP_FILE_URLS_JSON".to_string(), serde_json::to_string(urls)?);
                Ok(vec![self.spec(name, env, &self.settings.dep_files_job_args)])
            }
        }
    }

    /// Submits every spec independently.
    ///
    /// A failed submission does not stop the others. Results come back in
    /// input order.
    pub async fn submit_all(&self, specs: &[JobSpec]) -> Vec<(String, Result<String>)> {
        let submissions = specs.iter().map(|spec| async move {
            let result = self.sandbox.submit(spec).await.map_err(|e| {
                anyhow::Error::new(ScanError::JobSubmission {
                    job_name: spec.name.clone(),
                    details: format!("{:#}", e),
                })
            });
            (spec.name.clone(), result)
        });
        let results = join_all(submissions).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(submitted = results.len() - failed, failed, "submitted jobs");
        results
    }

    async fn target_versions(&self, name: &str, requested: Option<&str>) -> Result<Vec<String>> {
        if let Some(version) = requested.filter(|v| *v != LATEST_VERSION_TAG) {
            validate_package_version(version)?;
            return Ok(vec![version.to_string()]);
        }

        let mut releases: Vec<RegistryEntry> = self
            .registry_entries(name)
            .await?
            .into_iter()
            .filter(|entry| is_release_version(&entry.package_version))
            .collect();
        releases.sort_by(|a, b| {
            a.published_at
                .cmp(&b.published_at)
                .then_with(|| a.package_version.cmp(&b.package_version))
        });

        let versions: Vec<String> = if requested == Some(LATEST_VERSION_TAG) {
            releases
                .last()
                .map(|entry| vec![entry.package_version.clone()])
                .unwrap_or_default()
        } else {
            releases.into_iter().map(|entry| entry.package_version).collect()
        };
        debug!(package = %name, versions = versions.len(), "resolved target versions");
        Ok(versions)
    }

    async fn registry_entries(&self, name: &str) -> Result<Vec<RegistryEntry>> {
        let language = self.settings.language();
        let stored = self.store.registry_entries_for(name, language)?;
        if !stored.is_empty() {
            return Ok(stored);
        }

        let batch = self
            .source
            .registry_entries(&[name.to_string()], language)
            .await;
        for (identifier, error) in &batch.failures {
            warn!(%identifier, %error, "registry lookup failed");
        }
        self.store.save_registry_entries(batch.found)?;
        self.store.registry_entries_for(name, language)
    }

    fn package_job(&self, scan: &Scan, name: &str, version: &str) -> JobSpec {
        let job_name = Self::job_name(scan, "pkg");
        let mut env = self.base_env(scan, &job_name);
        env.insert("PACKAGE_NAME".to_string(), name.to_string());
        env.insert("PACKAGE_VERSION".to_string(), version.to_string());
        self.spec(job_name, env, &self.settings.package_job_args)
    }

    fn base_env(&self, scan: &Scan, job_name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("JOB_NAME".to_string(), job_name.to_string()),
            ("SCAN_ID".to_string(), scan.id.value().to_string()),
            ("LANGUAGE".to_string(), self.settings.language().to_string()),
            (
                "PACKAGE_MANAGER".to_string(),
                self.settings.package_manager.to_string(),
            ),
            ("INSTALL_TARGET".to_string(), ".".to_string()),
        ])
    }

    fn spec(&self, name: String, env: BTreeMap<String, String>, args: &[String]) -> JobSpec {
        JobSpec {
            name,
            image_name: self.settings.image_name.clone(),
            args: args.to_vec(),
            env,
            backoff_limit: self.settings.backoff_limit,
            namespace: self.settings.namespace.clone(),
        }
    }

    fn job_name(scan: &Scan, kind: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("scan-{}-{}-{}", scan.id.value(), kind, &suffix[..8])
    }
}
