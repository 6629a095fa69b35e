use crate::shared::error::ScanError;
use crate::shared::Result;
use std::fs;
use std::path::Path;

/// Maximum size of a listing file or spooled envelope (100 MB)
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Longest package name accepted by the npm registry
pub const MAX_PACKAGE_NAME_LEN: usize = 214;

const MAX_VERSION_LEN: usize = 128;

/// Validates that a path exists and is a regular file (not a directory or symlink)
///
/// # Arguments
/// * `path` - The path to validate
/// * `file_description` - Description of the file (e.g., "dependency listing")
///
/// # Errors
/// Returns an error if:
/// - The path doesn't exist
/// - The path is a symbolic link
/// - The path is not a regular file
pub fn validate_regular_file(path: &Path, file_description: &str) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| ScanError::FileReadError {
        path: path.to_path_buf(),
        details: format!("Failed to read {} metadata: {}", file_description, e),
    })?;

    if metadata.is_symlink() {
        return Err(ScanError::SecurityError {
            path: path.to_path_buf(),
            reason: format!("{} is a symbolic link", file_description),
            hint: "Pass the path of the regular file the link points to".to_string(),
        }
        .into());
    }

    if !metadata.is_file() {
        anyhow::bail!("{} is not a regular file", path.display());
    }

    validate_file_size(metadata.len(), path, MAX_FILE_SIZE)
}

/// Validates file size is within acceptable limits
pub fn validate_file_size(file_size: u64, path: &Path, max_size: u64) -> Result<()> {
    if file_size > max_size {
        return Err(ScanError::SecurityError {
            path: path.to_path_buf(),
            reason: format!(
                "file is too large ({} bytes, maximum {} bytes)",
                file_size, max_size
            ),
            hint: "Split the listing or raise the limit".to_string(),
        }
        .into());
    }
    Ok(())
}

/// Validates a package name before it is placed in a URL path or a job environment.
///
/// Accepts plain names (`left-pad`, `serde_json`) and npm scoped names
/// (`@hapi/bounce`). Rejects path traversal, query/fragment characters,
/// whitespace and control characters.
pub fn validate_package_name(name: &str) -> std::result::Result<(), ScanError> {
    let invalid = |reason: &str| ScanError::Validation {
        message: format!("package name {:?} {}", name, reason),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_PACKAGE_NAME_LEN {
        return Err(invalid("is too long"));
    }
    if name.contains("..") {
        return Err(invalid("contains '..'"));
    }

    let unscoped = match name.strip_prefix('@') {
        Some(scoped) => {
            let (scope, rest) = scoped
                .split_once('/')
                .ok_or_else(|| invalid("has a scope without a package part"))?;
            if scope.is_empty() || rest.is_empty() {
                return Err(invalid("has an empty scope or package part"));
            }
            check_name_chars(scope).map_err(|_| invalid("has an invalid scope"))?;
            rest
        }
        None => name,
    };

    check_name_chars(unscoped).map_err(|_| invalid("contains URL-unsafe characters"))
}

fn check_name_chars(part: &str) -> std::result::Result<(), ()> {
    if part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
    {
        Ok(())
    } else {
        Err(())
    }
}

/// Validates a version string or dist-tag (`1.2.3`, `v2.0.0+build.1`, `latest`).
pub fn validate_package_version(version: &str) -> std::result::Result<(), ScanError> {
    let valid = !version.is_empty()
        && version.len() <= MAX_VERSION_LEN
        && !version.contains("..")
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_' | '='));

    if valid {
        Ok(())
    } else {
        Err(ScanError::Validation {
            message: format!("package version {:?} is not a valid version", version),
        })
    }
}

/// Returns true for plain release versions: `[=v]MAJOR.MINOR.PATCH[+build]`.
///
/// Pre-releases (`1.0.0-rc.1`) are not release versions.
pub fn is_release_version(version: &str) -> bool {
    let rest = version
        .strip_prefix('=')
        .or_else(|| version.strip_prefix('v'))
        .unwrap_or(version);

    let (core, build) = match rest.split_once('+') {
        Some((core, build)) => (core, Some(build)),
        None => (rest, None),
    };

    let mut parts = core.split('.');
    let numeric = |p: Option<&str>| {
        p.map(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    };
    let core_ok =
        numeric(parts.next()) && numeric(parts.next()) && numeric(parts.next()) && parts.next().is_none();

    let build_ok = build
        .map(|b| b.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.'))
        .unwrap_or(true);

    core_ok && build_ok
}

/// Validates a dependency manifest URL handed to a sandbox job.
pub fn validate_manifest_url(url: &str) -> std::result::Result<(), ScanError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ScanError::Validation {
        message: format!("manifest URL {:?} is invalid: {}", url, e),
    })?;

    if !matches!(parsed.scheme(), "https" | "http") {
        return Err(ScanError::Validation {
            message: format!("manifest URL {:?} must use http or https", url),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_validate_regular_file_success() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("npm-list.json");
        fs::write(&file_path, "{}").unwrap();

        assert!(validate_regular_file(&file_path, "dependency listing").is_ok());
    }

    #[test]
    fn test_validate_regular_file_is_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = validate_regular_file(temp_dir.path(), "dependency listing");
        assert!(result.unwrap_err().to_string().contains("not a regular file"));
    }

    #[test]
    fn test_validate_regular_file_missing() {
        let result = validate_regular_file(Path::new("/nonexistent/listing.json"), "listing");
        assert!(result.unwrap_err().to_string().contains("Failed to read file"));
    }

    #[test]
    fn test_validate_file_size_exceeds_limit() {
        let path = PathBuf::from("/test/file.json");
        let result = validate_file_size(MAX_FILE_SIZE + 1, &path, MAX_FILE_SIZE);
        assert!(result.unwrap_err().to_string().contains("too large"));
    }

    #[test]
    fn test_package_name_plain_and_scoped() {
        assert!(validate_package_name("left-pad").is_ok());
        assert!(validate_package_name("serde_json").is_ok());
        assert!(validate_package_name("@hapi/bounce").is_ok());
        assert!(validate_package_name("lodash.merge").is_ok());
    }

    #[test]
    fn test_package_name_rejects_traversal_and_url_chars() {
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("../etc/passwd").is_err());
        assert!(validate_package_name("foo/bar").is_err());
        assert!(validate_package_name("foo?x=1").is_err());
        assert!(validate_package_name("foo#frag").is_err());
        assert!(validate_package_name("foo bar").is_err());
        assert!(validate_package_name("@scope").is_err());
        assert!(validate_package_name("@/pkg").is_err());
        assert!(validate_package_name(&"a".repeat(MAX_PACKAGE_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_package_version_validation() {
        assert!(validate_package_version("1.2.3").is_ok());
        assert!(validate_package_version("latest").is_ok());
        assert!(validate_package_version("2.0.0-rc.1").is_ok());
        assert!(validate_package_version("").is_err());
        assert!(validate_package_version("1.0.0; rm -rf /").is_err());
    }

    #[test]
    fn test_release_versions() {
        assert!(is_release_version("0.0.1"));
        assert!(is_release_version("=1.2.3"));
        assert!(is_release_version("v10.20.30"));
        assert!(is_release_version("1.0.0+build.7"));
        assert!(!is_release_version("1.0.0-beta.1"));
        assert!(!is_release_version("1.0"));
        assert!(!is_release_version("1.0.0.0"));
        assert!(!is_release_version("latest"));
    }

    #[test]
    fn test_manifest_url_validation() {
        assert!(validate_manifest_url("https://example.com/package.json").is_ok());
        assert!(validate_manifest_url("file:///etc/passwd").is_err());
        assert!(validate_manifest_url("not a url").is_err());
    }
}
