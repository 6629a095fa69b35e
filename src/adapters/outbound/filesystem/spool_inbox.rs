use super::file_reader::FileSystemReader;
use crate::ports::outbound::{Delivery, ResultSource};
use crate::risk_scoring::domain::ResultEnvelope;
use crate::shared::error::ScanError;
use crate::shared::Result;
use anyhow::Context;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Subdirectory unreadable envelopes are moved into
pub const REJECTED_DIR: &str = "rejected";

/// SpoolInbox adapter reading result envelopes from a spool directory
///
/// Every `*.json` file directly inside the directory is one envelope and
/// its file name is the delivery receipt. Acking deletes the file; a
/// nacked file stays where it is and is picked up by the next receive.
pub struct SpoolInbox {
    dir: PathBuf,
}

impl SpoolInbox {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create spool directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pending_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list spool directory {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some("json")
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn reject(&self, path: &Path, reason: &anyhow::Error) -> Result<()> {
        let rejected_dir = self.dir.join(REJECTED_DIR);
        fs::create_dir_all(&rejected_dir)?;
        let Some(file_name) = path.file_name() else {
            return Ok(());
        };
        warn!(
            file = %path.display(),
            error = %format!("{:#}", reason),
            "moving unreadable envelope to {}/", REJECTED_DIR
        );
        fs::rename(path, rejected_dir.join(file_name))
            .with_context(|| format!("Failed to reject {}", path.display()))
    }

    /// Resolves a receipt to a file directly inside the spool directory.
    fn receipt_path(&self, receipt: &str) -> Result<PathBuf> {
        if receipt.is_empty() || receipt.contains(['/', '\\']) || receipt.contains("..") {
            anyhow::bail!("Invalid spool receipt {:?}", receipt);
        }
        Ok(self.dir.join(receipt))
    }

    fn read_envelope(path: &Path) -> Result<ResultEnvelope> {
        let content = FileSystemReader::safe_read_file(path, "result envelope")?;
        serde_json::from_str(&content).map_err(|e| {
            anyhow::Error::new(ScanError::EnvelopeParse {
                message_id: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                details: e.to_string(),
            })
        })
    }
}

#[async_trait]
impl ResultSource for SpoolInbox {
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut deliveries = Vec::new();
        for path in self.pending_files()? {
            if deliveries.len() >= max {
                break;
            }
            match Self::read_envelope(&path) {
                Ok(envelope) => {
                    let receipt = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(str::to_string)
                        .with_context(|| format!("Non UTF-8 spool file {}", path.display()))?;
                    deliveries.push(Delivery { receipt, envelope });
                }
                Err(e) => self.reject(&path, &e)?,
            }
        }
        debug!(count = deliveries.len(), "received spooled envelopes");
        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        let path = self.receipt_path(receipt)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            // acked twice
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to ack {}", path.display())),
        }
    }

    async fn nack(&self, receipt: &str) -> Result<()> {
        self.receipt_path(receipt)?;
        debug!(receipt, "leaving envelope for redelivery");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ENVELOPE: &str = r#"{
        "message_id": "m-1",
        "attributes": {"JOB_NAME": "scan-1-pkg-0000abcd"},
        "data": [{"type": "task_complete"}]
    }"#;

    fn spool() -> (TempDir, SpoolInbox) {
        let temp_dir = TempDir::new().unwrap();
        let inbox = SpoolInbox::new(temp_dir.path().join("spool")).unwrap();
        (temp_dir, inbox)
    }

    #[tokio::test]
    async fn test_receive_then_ack_deletes_file() {
        let (_temp, inbox) = spool();
        fs::write(inbox.dir().join("001.json"), ENVELOPE).unwrap();

        let deliveries = inbox.receive(10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].receipt, "001.json");
        assert_eq!(deliveries[0].envelope.message_id, "m-1");

        inbox.ack(&deliveries[0].receipt).await.unwrap();
        assert!(!inbox.dir().join("001.json").exists());
        // a second ack is harmless
        inbox.ack("001.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_nack_leaves_file_for_redelivery() {
        let (_temp, inbox) = spool();
        fs::write(inbox.dir().join("001.json"), ENVELOPE).unwrap();

        let first = inbox.receive(10).await.unwrap();
        inbox.nack(&first[0].receipt).await.unwrap();

        let second = inbox.receive(10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].envelope.message_id, "m-1");
    }

    #[tokio::test]
    async fn test_invalid_envelope_is_moved_to_rejected() {
        let (_temp, inbox) = spool();
        fs::write(inbox.dir().join("bad.json"), "not json").unwrap();
        fs::write(inbox.dir().join("good.json"), ENVELOPE).unwrap();

        let deliveries = inbox.receive(10).await.unwrap();

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].receipt, "good.json");
        assert!(!inbox.dir().join("bad.json").exists());
        assert!(inbox.dir().join(REJECTED_DIR).join("bad.json").exists());
    }

    #[tokio::test]
    async fn test_receive_respects_max_and_ignores_other_files() {
        let (_temp, inbox) = spool();
        for i in 0..3 {
            fs::write(
                inbox.dir().join(format!("{:03}.json", i)),
                ENVELOPE.replace("m-1", &format!("m-{}", i)),
            )
            .unwrap();
        }
        fs::write(inbox.dir().join("notes.txt"), "ignored").unwrap();

        let deliveries = inbox.receive(2).await.unwrap();

        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].envelope.message_id, "m-0");
        assert!(inbox.dir().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_receipt_cannot_escape_spool_directory() {
        let (_temp, inbox) = spool();
        assert!(inbox.ack("../outside.json").await.is_err());
        assert!(inbox.nack("a/b.json").await.is_err());
    }
}
