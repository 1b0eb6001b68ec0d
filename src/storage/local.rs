//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── YYYY-MM-DD/
//!     └── {home} vs {away}.csv
//! ```
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! failed write never leaves a half-written box score behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::PlayerRecord;
use crate::storage::{BoxScoreStorage, WriteSummary, table};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Folder holding one day's files.
    pub fn day_dir(&self, day: &str) -> PathBuf {
        self.root_dir.join(day)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl BoxScoreStorage for LocalStorage {
    async fn ensure_day(&self, day: &str) -> Result<PathBuf> {
        let dir = self.day_dir(day);
        tokio::fs::create_dir_all(&dir).await?;
        log::info!("Output folder ready: {}", dir.display());
        Ok(dir)
    }

    async fn write_box_score(
        &self,
        day: &str,
        file_name: &str,
        records: &[PlayerRecord],
    ) -> Result<WriteSummary> {
        if file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(AppError::validation(format!(
                "refusing to write box score with unsafe file name '{}'",
                file_name
            )));
        }

        let path = self.day_dir(day).join(file_name);
        let bytes = table::render_csv(records)?;
        self.write_bytes(&path, &bytes).await?;

        let summary = WriteSummary {
            location: path,
            rows: records.len(),
            columns: table::columns(records).len(),
        };
        log::info!(
            "Wrote {} rows x {} columns to {}",
            summary.rows,
            summary.columns,
            summary.location.display()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn records(points: i64) -> Vec<PlayerRecord> {
        vec![serde_json::from_value(json!({ "points": points, "team": "Boston Celtics" })).unwrap()]
    }

    #[tokio::test]
    async fn test_ensure_day_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("games"));

        let first = storage.ensure_day("2023-03-09").await.unwrap();
        let second = storage.ensure_day("2023-03-09").await.unwrap();

        assert_eq!(first, second);
        assert!(first.is_dir());
        let entries: Vec<_> = std::fs::read_dir(tmp.path().join("games")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_write_box_score_overwrites() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let name = "Boston Celtics vs Miami Heat.csv";

        storage.write_box_score("2023-03-09", name, &records(10)).await.unwrap();
        let summary = storage
            .write_box_score("2023-03-09", name, &records(12))
            .await
            .unwrap();

        assert_eq!(summary.rows, 1);
        assert_eq!(summary.columns, 2);
        let content = std::fs::read_to_string(tmp.path().join("2023-03-09").join(name)).unwrap();
        assert_eq!(content, "points,team\n12,Boston Celtics\n");

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("2023-03-09"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_in_file_name() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let result = storage
            .write_box_score("2023-03-09", "../escape.csv", &records(1))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
