//! Run reports and ranked results.

use crate::analysis::Dossier;
use crate::diagnostics::Diagnostic;
use crate::roster::CharacterId;
use crate::state::BookState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every chapter committed.
    Completed,
    /// A chapter failed and the run halted.
    ChapterFailed,
    /// An abort was requested.
    Aborted,
    /// Chunks remain and nothing has stopped the run.
    InProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Analysis,
    Aggregation,
    Aborted,
}

/// The chapter that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterFailure {
    pub chapter_id: String,
    pub chapter_index: usize,
    /// The chunk being processed, if the failure happened inside one.
    pub chunk_index: Option<usize>,
    pub kind: FailureKind,
    pub reason: String,
}

/// Summary of a run at chapter granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Chapters whose aggregates are in the book.
    pub completed_chapters: Vec<String>,
    pub failed_chapter: Option<ChapterFailure>,
    /// Chapters after the failed or current one.
    pub not_attempted: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// A dossier joined with the roster and book tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCharacter {
    pub rank: u32,
    pub character_id: CharacterId,
    pub name: String,
    pub aliases: Vec<String>,
    pub mentioned_count: u64,
    pub appeared_scenes: u64,
    pub rationale: String,
}

/// Join dossiers with book state, ordered by rank then id.
///
/// Ranks are taken from the dossiers as-is. A dossier for a character the
/// roster does not know keeps its id as the name.
pub fn rank_characters(state: &BookState, mut dossiers: Vec<Dossier>) -> Vec<RankedCharacter> {
    dossiers.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| a.character_id.cmp(&b.character_id))
    });

    dossiers
        .into_iter()
        .map(|dossier| {
            let character = state.roster.get(&dossier.character_id);
            RankedCharacter {
                rank: dossier.rank,
                name: character
                    .map(|c| c.canonical_name.clone())
                    .unwrap_or_else(|| dossier.character_id.to_string()),
                aliases: character
                    .map(|c| c.aliases.iter().cloned().collect())
                    .unwrap_or_default(),
                mentioned_count: state.mentions_of(&dossier.character_id),
                appeared_scenes: state.appearances_of(&dossier.character_id),
                character_id: dossier.character_id,
                rationale: dossier.rationale,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Chapter, MentionTally};
    use serde_json::Value;

    fn dossier(id: &str, rank: u32) -> Dossier {
        Dossier {
            character_id: id.into(),
            rank,
            rationale: format!("rank {rank}"),
            details: Value::Null,
        }
    }

    #[test]
    fn test_rank_join() {
        let mut state = BookState::new(vec![Chapter::new("ch1", "")]).unwrap();
        let jon = state.roster.register("Jon Snow", &["Jon"]);
        let arya = state.roster.register("Arya Stark", &[]);
        state
            .book_mentions
            .insert(jon.clone(), MentionTally { mentioned_count: 12 });
        state.book_appearances.insert(jon.clone(), 4);

        let ranked = rank_characters(
            &state,
            vec![dossier(arya.as_str(), 2), dossier(jon.as_str(), 1)],
        );

        assert_eq!(ranked[0].character_id, jon);
        assert_eq!(ranked[0].name, "Jon Snow");
        assert_eq!(ranked[0].aliases, vec!["jon", "jon snow"]);
        assert_eq!(ranked[0].mentioned_count, 12);
        assert_eq!(ranked[0].appeared_scenes, 4);
        assert_eq!(ranked[1].character_id, arya);
        assert_eq!(ranked[1].mentioned_count, 0);
    }

    #[test]
    fn test_unknown_character_keeps_id() {
        let state = BookState::new(vec![Chapter::new("ch1", "")]).unwrap();
        let ranked = rank_characters(&state, vec![dossier("char_042", 1)]);

        assert_eq!(ranked[0].name, "char_042");
        assert!(ranked[0].aliases.is_empty());
    }
}
