//! The diagnostic trail for non-fatal conditions.
//!
//! Each condition is emitted as a `tracing` warning and kept as a typed
//! record, so a run's report shows everything that was worked around.

use crate::roster::{AliasConflict, CharacterId};
use crate::scene::FallbackReason;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A non-fatal condition met while processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Diagnostic {
    /// The chapter could not be split on structure and became one scene.
    SegmentationFallback {
        chapter_id: String,
        reason: FallbackReason,
    },
    /// A single scene exceeded the chunk budget and became its own chunk.
    ChunkOverflow {
        chapter_id: String,
        chunk_index: usize,
        scene_index: usize,
        char_count: usize,
        budget: usize,
    },
    /// An ambiguous name was settled by tie-break.
    AliasConflict {
        chapter_id: String,
        chunk_index: usize,
        candidate: String,
        chosen: CharacterId,
        contenders: Vec<CharacterId>,
    },
}

impl Diagnostic {
    pub fn alias_conflict(chapter_id: &str, chunk_index: usize, conflict: &AliasConflict) -> Self {
        Diagnostic::AliasConflict {
            chapter_id: chapter_id.to_string(),
            chunk_index,
            candidate: conflict.candidate.clone(),
            chosen: conflict.chosen.clone(),
            contenders: conflict.contenders.clone(),
        }
    }

    pub fn chapter_id(&self) -> &str {
        match self {
            Diagnostic::SegmentationFallback { chapter_id, .. }
            | Diagnostic::ChunkOverflow { chapter_id, .. }
            | Diagnostic::AliasConflict { chapter_id, .. } => chapter_id,
        }
    }

    fn emit(&self) {
        match self {
            Diagnostic::SegmentationFallback { chapter_id, reason } => {
                warn!(chapter_id = %chapter_id, reason = reason.describe(), "segmentation fallback");
            }
            Diagnostic::ChunkOverflow {
                chapter_id,
                chunk_index,
                scene_index,
                char_count,
                budget,
            } => {
                warn!(
                    chapter_id = %chapter_id,
                    chunk_index,
                    scene_index,
                    char_count,
                    budget,
                    "scene exceeds chunk budget"
                );
            }
            Diagnostic::AliasConflict {
                chapter_id,
                chunk_index,
                candidate,
                chosen,
                contenders,
            } => {
                warn!(
                    chapter_id = %chapter_id,
                    chunk_index,
                    candidate = %candidate,
                    chosen = %chosen,
                    contenders = contenders.len(),
                    "ambiguous alias resolved by tie-break"
                );
            }
        }
    }
}

/// Ordered record of every diagnostic in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and keep a diagnostic. A chapter that runs again after a resume
    /// does not repeat an entry already in the log.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        if self.entries.contains(&diagnostic) {
            return;
        }
        diagnostic.emit();
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_chapter<'a>(&'a self, chapter_id: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.entries.iter().filter(move |d| d.chapter_id() == chapter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_order() {
        let mut log = DiagnosticLog::new();
        log.record(Diagnostic::SegmentationFallback {
            chapter_id: "ch1".to_string(),
            reason: FallbackReason::EmptyText,
        });
        log.record(Diagnostic::ChunkOverflow {
            chapter_id: "ch2".to_string(),
            chunk_index: 0,
            scene_index: 0,
            char_count: 9000,
            budget: 5000,
        });

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].chapter_id(), "ch1");
        assert_eq!(log.for_chapter("ch2").count(), 1);
    }

    #[test]
    fn test_repeated_entry_is_kept_once() {
        let mut log = DiagnosticLog::new();
        let fallback = Diagnostic::SegmentationFallback {
            chapter_id: "ch1".to_string(),
            reason: FallbackReason::EmptyText,
        };
        log.record(fallback.clone());
        log.record(fallback);

        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_wire_format_is_tagged() {
        let diagnostic = Diagnostic::alias_conflict(
            "ch3",
            1,
            &AliasConflict {
                candidate: "stark".to_string(),
                chosen: "char_001".into(),
                contenders: vec!["char_004".into()],
            },
        );
        let value = serde_json::to_value(&diagnostic).unwrap();

        assert_eq!(value["kind"], "alias_conflict");
        assert_eq!(value["chosen"], "char_001");
        assert_eq!(value["contenders"][0], "char_004");
    }
}
