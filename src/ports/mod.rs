/// Ports module defining interfaces for hexagonal architecture
///
/// Only outbound (driven) ports exist: the use cases are called directly by
/// the binary and by tests.
pub mod outbound;
