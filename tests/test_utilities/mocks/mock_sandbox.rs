use async_trait::async_trait;
use depwatch::prelude::*;
use std::sync::Mutex;

/// Mock JobSandbox recording every submitted spec
#[derive(Default)]
pub struct MockSandbox {
    pub submitted: Mutex<Vec<JobSpec>>,
    pub should_fail: bool,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            should_fail: true,
        }
    }

    pub fn job_names(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|spec| spec.name.clone())
            .collect()
    }
}

#[async_trait]
impl JobSandbox for MockSandbox {
    async fn submit(&self, spec: &JobSpec) -> Result<String> {
        if self.should_fail {
            anyhow::bail!("Mock sandbox rejected {}", spec.name);
        }
        self.submitted.lock().unwrap().push(spec.clone());
        Ok(format!("{}-id", spec.name))
    }
}
