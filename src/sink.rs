//! Output side: where events and file-logged replies go.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::types::OutputEvent;

/// The display surface. Events must be delivered in publish order.
#[async_trait]
pub trait OutputSink: Send + Sync {
    fn publish(&self, event: OutputEvent);

    /// Append `text` to the log file `file_name` (file-output mode).
    async fn write_append(&self, file_name: &str, text: &str) -> Result<()>;

    /// Human-readable location of the log file, shown when a reply completes.
    fn log_location(&self, file_name: &str) -> String {
        format!("{}.md", file_name)
    }
}

/// Forwards events over an unbounded channel and appends file output to
/// `<log_dir>/<name>.md`.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutputEvent>,
    log_dir: PathBuf,
}

impl ChannelSink {
    pub fn new(log_dir: impl Into<PathBuf>) -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                log_dir: log_dir.into(),
            },
            rx,
        )
    }

    fn log_path(&self, file_name: &str) -> PathBuf {
        self.log_dir.join(format!("{}.md", file_name))
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    fn publish(&self, event: OutputEvent) {
        // The receiver is gone only when the front end is shutting down.
        let _ = self.tx.send(event);
    }

    async fn write_append(&self, file_name: &str, text: &str) -> Result<()> {
        let path = self.log_path(file_name);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        file.write_all(text.as_bytes())
            .await
            .with_context(|| format!("Failed to write log file: {}", path.display()))?;
        file.flush().await?;
        Ok(())
    }

    fn log_location(&self, file_name: &str) -> String {
        self.log_path(file_name).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Runtime::new().unwrap()
    }

    #[test]
    fn test_events_arrive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, mut rx) = ChannelSink::new(dir.path());
        sink.publish(OutputEvent::Loading);
        sink.publish(OutputEvent::Response("a".to_string()));
        sink.publish(OutputEvent::Response("ab".to_string()));

        assert_eq!(rx.try_recv().unwrap(), OutputEvent::Loading);
        assert_eq!(rx.try_recv().unwrap(), OutputEvent::Response("a".to_string()));
        assert_eq!(rx.try_recv().unwrap(), OutputEvent::Response("ab".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_write_append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _rx) = ChannelSink::new(dir.path());
        rt().block_on(async {
            sink.write_append("notes", "## Q\n\n").await.unwrap();
            sink.write_append("notes", "hello").await.unwrap();
            sink.write_append("notes", " world").await.unwrap();
        });
        let text = std::fs::read_to_string(dir.path().join("notes.md")).unwrap();
        assert_eq!(text, "## Q\n\nhello world");
        assert!(sink.log_location("notes").ends_with("notes.md"));
    }

    #[test]
    fn test_write_append_missing_dir_fails() {
        let (sink, _rx) = ChannelSink::new("/tmp/__sidechat_missing_dir__/x");
        assert!(rt().block_on(sink.write_append("out", "x")).is_err());
    }
}
