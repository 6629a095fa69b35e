use crate::risk_scoring::domain::{Advisory, AdvisoryFields, AdvisoryKey, PackageVersionId};
use crate::shared::Result;
use std::collections::BTreeSet;

/// AdvisoryRepository port for vulnerability records
pub trait AdvisoryRepository: Send + Sync {
    /// Inserts or corrects the advisory identified by `key`.
    ///
    /// `fields` replace the stored ones. `impacted` is unioned into the
    /// stored impacted set, which therefore never shrinks.
    fn upsert_advisory(
        &self,
        key: AdvisoryKey,
        fields: AdvisoryFields,
        impacted: &BTreeSet<PackageVersionId>,
    ) -> Result<Advisory>;

    fn advisory(&self, key: &AdvisoryKey) -> Result<Option<Advisory>>;

    /// Advisories whose impacted set contains `id`.
    fn advisories_impacting(&self, id: PackageVersionId) -> Result<Vec<Advisory>>;
}
