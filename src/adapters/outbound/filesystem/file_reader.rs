use crate::ports::outbound::ListingReader;
use crate::shared::error::ScanError;
use crate::shared::security::validate_regular_file;
use crate::shared::Result;
use std::fs;
use std::path::Path;

/// FileSystemReader adapter for reading dependency listings from disk
///
/// Symbolic links, non-regular files and files over the size limit are
/// rejected before any content is read.
pub struct FileSystemReader;

impl FileSystemReader {
    pub fn new() -> Self {
        Self
    }

    /// Reads `path` after the regular-file and size checks.
    pub(crate) fn safe_read_file(path: &Path, file_description: &str) -> Result<String> {
        validate_regular_file(path, file_description)?;
        fs::read_to_string(path).map_err(|e| {
            ScanError::FileReadError {
                path: path.to_path_buf(),
                details: format!("Failed to read {}: {}", file_description, e),
            }
            .into()
        })
    }
}

impl Default for FileSystemReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingReader for FileSystemReader {
    fn read_listing(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(ScanError::FileReadError {
                path: path.to_path_buf(),
                details: "dependency listing does not exist".to_string(),
            }
            .into());
        }
        Self::safe_read_file(path, "dependency listing")
    }
}
