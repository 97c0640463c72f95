//! Snapshot persistence for inspecting and resuming runs.
//!
//! A snapshot mirrors the book state: chapters, current position, the full
//! roster, mention and appearance tallies, evidence, chapter summaries and
//! the diagnostic trail. It is written as pretty JSON.

use crate::diagnostics::DiagnosticLog;
use crate::state::BookState;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A saved run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Format version for compatibility checking.
    pub version: u32,

    pub run_id: Uuid,

    /// Seconds since the Unix epoch.
    pub saved_at: String,

    pub state: BookState,

    #[serde(default)]
    pub diagnostics: DiagnosticLog,
}

impl BookSnapshot {
    pub fn new(run_id: Uuid, state: BookState, diagnostics: DiagnosticLog) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            run_id,
            saved_at: timestamp_now(),
            state,
            diagnostics,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Parse a snapshot, checking its version.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }

        let header: Header = serde_json::from_str(content)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: header.version,
            });
        }

        Ok(serde_json::from_str(content)?)
    }
}

/// Current time as seconds since the Unix epoch.
fn timestamp_now() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Chapter;
    use tempfile::TempDir;

    fn snapshot() -> BookSnapshot {
        let mut state = BookState::new(Chapter::sequential(["Jon rode north.", "Arya hid."])).unwrap();
        state.roster.register("Jon Snow", &["Jon"]);
        BookSnapshot::new(Uuid::new_v4(), state, DiagnosticLog::new())
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        let saved = snapshot();

        saved.save_json(&path).await.unwrap();
        let loaded = BookSnapshot::load_json(&path).await.unwrap();

        assert_eq!(loaded, saved);
        assert!(loaded.state.roster.find_by_alias("jon").is_some());
    }

    #[test]
    fn test_version_mismatch() {
        let mut value = serde_json::to_value(snapshot()).unwrap();
        value["version"] = serde_json::json!(99);

        let err = BookSnapshot::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: 99
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = BookSnapshot::load_json(dir.path().join("absent.json")).await;
        assert!(matches!(result, Err(PersistError::Io(_))));
    }

    #[test]
    fn test_snapshot_field_names() {
        let value = serde_json::to_value(snapshot()).unwrap();
        let state = &value["state"];

        for field in [
            "chapters",
            "current_chapter_index",
            "roster",
            "book_mentions",
            "book_evidence",
            "chapter_summaries",
        ] {
            assert!(state.get(field).is_some(), "missing {field}");
        }
        assert_eq!(state["roster"]["characters"][0]["canonical_name"], "Jon Snow");
    }
}
