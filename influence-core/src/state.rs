//! Book and chapter state.
//!
//! State has two layers: book-level aggregates that persist across
//! chapters, and per-chapter scratch that is created when a chapter is
//! loaded and discarded once its totals are committed to the book.

use crate::chunk::{plan_chunks, SceneChunk};
use crate::evidence::{totals_by_character, EvidenceTotals, InfluenceEvidence};
use crate::roster::{CharacterId, EntityRoster};
use crate::scene::{segment, FallbackReason, Scene};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};
use thiserror::Error;

/// Errors from validating the chapter list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Chapter list is empty")]
    NoChapters,

    #[error("Duplicate chapter id: {0}")]
    DuplicateChapterId(String),

    #[error("Chapter {0} has a blank id")]
    BlankChapterId(usize),
}

/// A chapter of the book. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(alias = "chapter_id")]
    pub id: String,
    pub text: String,
}

impl Chapter {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Chapters with sequential ids (`chapter_001`, ...) from bare texts.
    pub fn sequential<I, S>(texts: I) -> Vec<Chapter>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chapter::new(format!("chapter_{:03}", i + 1), text))
            .collect()
    }
}

/// Check that the chapter list is non-empty with unique, non-blank ids.
pub fn validate_chapters(chapters: &[Chapter]) -> Result<(), InputError> {
    if chapters.is_empty() {
        return Err(InputError::NoChapters);
    }
    let mut seen = HashSet::new();
    for (index, chapter) in chapters.iter().enumerate() {
        if chapter.id.trim().is_empty() {
            return Err(InputError::BlankChapterId(index));
        }
        if !seen.insert(chapter.id.as_str()) {
            return Err(InputError::DuplicateChapterId(chapter.id.clone()));
        }
    }
    Ok(())
}

/// Total mentions of one character. Never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionTally {
    pub mentioned_count: u64,
}

/// A chapter's summary as returned by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub chapter_id: String,
    pub summary: Value,
}

/// Working state for the chapter being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterScratch {
    pub chapter_id: String,
    pub chapter_index: usize,
    pub scenes: Vec<Scene>,
    /// Chunks not yet processed, in order.
    pub pending_chunks: VecDeque<SceneChunk>,
    /// Equals the number of chunks committed for this chapter.
    pub next_chunk_index: usize,
    /// Working copy of the roster. Published to the book on chapter commit.
    pub roster: EntityRoster,
    pub mentions: BTreeMap<CharacterId, u64>,
    pub appearances: BTreeMap<CharacterId, u64>,
    pub evidence: Vec<InfluenceEvidence>,
    /// Latest running summary from the analyzer.
    pub summary: Option<Value>,
    /// Set when segmentation fell back to a single scene.
    pub segmentation_fallback: Option<FallbackReason>,
}

impl ChapterScratch {
    /// Segment and chunk a chapter, starting from a copy of the book roster.
    pub fn load(
        chapter: &Chapter,
        chapter_index: usize,
        roster: &EntityRoster,
        max_chunk_chars: usize,
        max_scene_chars: Option<usize>,
    ) -> Self {
        let segmentation = segment(&chapter.text, max_scene_chars);
        let pending_chunks = plan_chunks(&chapter.text, &segmentation.scenes, max_chunk_chars).into();

        Self {
            chapter_id: chapter.id.clone(),
            chapter_index,
            scenes: segmentation.scenes,
            pending_chunks,
            next_chunk_index: 0,
            roster: roster.clone(),
            mentions: BTreeMap::new(),
            appearances: BTreeMap::new(),
            evidence: Vec::new(),
            summary: None,
            segmentation_fallback: segmentation.fallback,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_chunks.is_empty()
    }

    /// Total chunks for this chapter, committed or pending.
    pub fn chunk_count(&self) -> usize {
        self.next_chunk_index + self.pending_chunks.len()
    }
}

/// All state for one run over a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookState {
    /// Set once at init.
    pub chapters: Vec<Chapter>,
    pub current_chapter_index: usize,
    pub roster: EntityRoster,
    pub book_mentions: BTreeMap<CharacterId, MentionTally>,
    /// Number of scenes each character appears in.
    #[serde(default)]
    pub book_appearances: BTreeMap<CharacterId, u64>,
    pub book_evidence: Vec<InfluenceEvidence>,
    /// Summaries in chapter order.
    pub chapter_summaries: Vec<ChapterSummary>,
    /// Ids of chapters whose aggregates are committed, in order.
    #[serde(default)]
    pub completed_chapters: Vec<String>,
    #[serde(default)]
    pub scratch: Option<ChapterScratch>,
}

impl BookState {
    /// Validate the chapter list and create empty state.
    pub fn new(chapters: Vec<Chapter>) -> Result<Self, InputError> {
        validate_chapters(&chapters)?;
        Ok(Self {
            chapters,
            current_chapter_index: 0,
            roster: EntityRoster::new(),
            book_mentions: BTreeMap::new(),
            book_appearances: BTreeMap::new(),
            book_evidence: Vec::new(),
            chapter_summaries: Vec::new(),
            completed_chapters: Vec::new(),
            scratch: None,
        })
    }

    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.chapters.get(self.current_chapter_index)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_chapters.len() == self.chapters.len()
    }

    /// Total mentions for a character across committed chapters.
    pub fn mentions_of(&self, id: &CharacterId) -> u64 {
        self.book_mentions
            .get(id)
            .map(|t| t.mentioned_count)
            .unwrap_or(0)
    }

    pub fn appearances_of(&self, id: &CharacterId) -> u64 {
        self.book_appearances.get(id).copied().unwrap_or(0)
    }

    pub fn summary_for(&self, chapter_id: &str) -> Option<&Value> {
        self.chapter_summaries
            .iter()
            .find(|s| s.chapter_id == chapter_id)
            .map(|s| &s.summary)
    }

    /// Evidence counts by type per character.
    pub fn evidence_totals(&self) -> BTreeMap<CharacterId, EvidenceTotals> {
        totals_by_character(&self.book_evidence)
    }

    /// Chapter ids after the current chapter.
    pub fn remaining_chapter_ids(&self) -> Vec<String> {
        self.chapters
            .iter()
            .skip(self.current_chapter_index + 1)
            .map(|c| c.id.clone())
            .collect()
    }
}
