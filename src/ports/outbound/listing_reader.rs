use crate::shared::Result;
use std::path::Path;

/// ListingReader port for reading saved dependency listings
///
/// A listing is the raw stdout of a package manager's dependency listing
/// command (`npm list --json`, `yarn list --json`, `cargo metadata`).
pub trait ListingReader {
    /// Reads the listing file at `path`
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file does not exist or is not a regular file
    /// - The file is a symbolic link or exceeds the size limit
    /// - The file cannot be read due to permissions or I/O errors
    fn read_listing(&self, path: &Path) -> Result<String>;
}
