/// Filesystem adapters for listing files and the result spool
mod file_reader;
mod spool_inbox;

pub use file_reader::FileSystemReader;
pub use spool_inbox::{SpoolInbox, REJECTED_DIR};
