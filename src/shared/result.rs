/// Result alias used at application and adapter boundaries.
/// Domain failures are typed (`ScanError`, `FetchError`) and converted into
/// `anyhow::Error` when they cross into this alias.
pub type Result<T> = std::result::Result<T, anyhow::Error>;
