// Alert channel boundary
//
// The delivery transport (SMTP relay, chat webhook, ...) lives outside this
// crate. `FileOutbox` is the in-tree implementation: one HTML file per
// alert, dropped into a directory the transport picks up.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

/// Outbound alert delivery.
pub trait AlertSender: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Writes each alert into `<dir>/<date>-<sequence>.html` with the recipient
/// and subject as an HTML comment preamble.
pub struct FileOutbox {
    dir: PathBuf,
}

impl FileOutbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileOutbox { dir: dir.into() }
    }

    fn next_path(&self, date: &str) -> Result<PathBuf> {
        // One alert cycle per day is the norm; the sequence suffix keeps
        // manual re-runs from clobbering an earlier file.
        for sequence in 0..1000 {
            let candidate = self.dir.join(format!("{}-{:03}.html", date, sequence));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        anyhow::bail!("outbox {} has 1000 alerts for {}", self.dir.display(), date)
    }
}

impl AlertSender for FileOutbox {
    fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating outbox directory {}", self.dir.display()))?;

        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let path = self.next_path(&date)?;

        let contents = format!(
            "<!-- to: {} -->\n<!-- subject: {} -->\n{}\n",
            recipient, subject, body
        );
        fs::write(&path, contents)
            .with_context(|| format!("writing alert to {}", path.display()))?;

        info!(path = %path.display(), recipient, "alert written to outbox");
        Ok(())
    }
}
