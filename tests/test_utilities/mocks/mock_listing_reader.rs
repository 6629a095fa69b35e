use depwatch::prelude::*;
use std::path::Path;

/// Mock ListingReader returning fixed content
pub struct MockListingReader {
    pub content: String,
    pub should_fail: bool,
}

impl MockListingReader {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            should_fail: false,
        }
    }

    pub fn with_failure() -> Self {
        Self {
            content: String::new(),
            should_fail: true,
        }
    }
}

impl ListingReader for MockListingReader {
    fn read_listing(&self, _path: &Path) -> Result<String> {
        if self.should_fail {
            anyhow::bail!("Mock listing read failure");
        }
        Ok(self.content.clone())
    }
}
