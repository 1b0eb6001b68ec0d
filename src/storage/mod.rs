//! Storage for scraped box scores.
//!
//! ## Directory Structure
//!
//! ```text
//! {output_base_dir}/
//! └── 2023-03-09/                          # one folder per scraped day
//!     ├── Boston Celtics vs Miami Heat.csv
//!     └── Denver Nuggets vs Los Angeles Lakers.csv
//! ```

pub mod local;
pub mod table;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::PlayerRecord;

// Re-export for convenience
pub use local::LocalStorage;
pub use table::render_csv;

/// Metadata about a written box score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    /// Where the file ended up
    pub location: PathBuf,
    /// Data rows written
    pub rows: usize,
    /// Columns in the header
    pub columns: usize,
}

/// Trait for box-score storage backends.
#[async_trait]
pub trait BoxScoreStorage: Send + Sync {
    /// Make sure the folder for `day` exists. Succeeds if it already does.
    async fn ensure_day(&self, day: &str) -> Result<PathBuf>;

    /// Write one game's rows as `file_name` inside the folder for `day`,
    /// replacing any previous file of that name.
    async fn write_box_score(
        &self,
        day: &str,
        file_name: &str,
        records: &[PlayerRecord],
    ) -> Result<WriteSummary>;
}
