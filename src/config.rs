// Runtime settings
//
// Loaded once at startup from a JSON file; everything except the paths and
// the recipient has a default matching the original deployment (batch size
// 50, threshold 0.9, hourly sync, daily alert).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding one CSV file per sheet (`Facility.csv`,
    /// `Occupant.csv`).
    pub workbook_dir: PathBuf,

    /// SQLite database file.
    pub database: PathBuf,

    /// Directory the alert files are written into.
    pub outbox_dir: PathBuf,

    /// Recipient recorded on each alert.
    pub alert_recipient: String,

    /// Rows per source window, store page and bulk write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Occupancy ratio above which a facility is reported.
    #[serde(default = "default_threshold")]
    pub occupancy_threshold: f64,

    /// Seconds between sync runs.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Seconds between alert runs.
    #[serde(default = "default_alert_interval")]
    pub alert_interval_secs: u64,
}

fn default_batch_size() -> usize {
    50
}

fn default_threshold() -> f64 {
    crate::occupancy::DEFAULT_THRESHOLD
}

fn default_sync_interval() -> u64 {
    60 * 60
}

fn default_alert_interval() -> u64 {
    24 * 60 * 60
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse settings JSON")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_from_file_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "workbook_dir": "/var/lib/census/workbook",
                "database": "/var/lib/census/census.db",
                "outbox_dir": "/var/lib/census/outbox",
                "alert_recipient": "ops@example.com"
            }}"#
        )
        .unwrap();
        drop(file);

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.occupancy_threshold, 0.9);
        assert_eq!(settings.sync_interval_secs, 3600);
        assert_eq!(settings.alert_interval_secs, 86400);
        assert_eq!(settings.alert_recipient, "ops@example.com");
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "workbook_dir": "wb",
                "database": "census.db",
                "outbox_dir": "outbox",
                "alert_recipient": "ops@example.com",
                "batch_size": 10,
                "occupancy_threshold": 0.75
            }"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.occupancy_threshold, 0.75);
    }

    #[test]
    fn test_missing_file_is_an_error_with_context() {
        let err = Settings::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("settings file"));
    }
}
