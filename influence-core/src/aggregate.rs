//! Folding chunk results into chapter scratch, and scratch into the book.
//!
//! Chunk commits only ever touch [`ChapterScratch`]. Book-level aggregates
//! change in exactly one place, [`StateAggregator::commit_chapter`], so a
//! chapter that fails part way leaves the book as it was.

use crate::evidence::InfluenceEvidence;
use crate::mentions::ChunkTally;
use crate::roster::EntityRoster;
use crate::state::{BookState, ChapterScratch, ChapterSummary, MentionTally};
use serde_json::Value;
use thiserror::Error;

/// A chunk was committed out of sequence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Chunk {got} already committed (next expected: {expected})")]
    AlreadyCommitted { expected: usize, got: usize },

    #[error("Chunk {got} committed out of order (next expected: {expected})")]
    OutOfOrder { expected: usize, got: usize },

    #[error("Commit for chapter '{got}' does not match current chapter '{expected}'")]
    ChapterMismatch { expected: String, got: String },

    #[error("Chapter '{chapter_id}' still has {pending} pending chunk(s)")]
    IncompleteChapter { chapter_id: String, pending: usize },
}

/// Everything produced while processing one chunk.
#[derive(Debug, Clone)]
pub struct ChunkCommit {
    pub chapter_id: String,
    pub chunk_index: usize,
    /// Roster after resolving this chunk's candidates.
    pub roster: EntityRoster,
    pub tally: ChunkTally,
    pub evidence: Vec<InfluenceEvidence>,
    pub updated_summary: Value,
}

/// What a chapter commit added to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterTotals {
    pub chapter_id: String,
    pub chunks: usize,
    pub mentions: u64,
    pub evidence: usize,
    pub new_characters: usize,
}

/// Applies commits to scratch and book state.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateAggregator;

impl StateAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Fold one chunk into the chapter scratch.
    ///
    /// The chunk must carry exactly `scratch.next_chunk_index`; anything
    /// else is rejected and the scratch is left untouched.
    pub fn commit_chunk(
        &self,
        scratch: &mut ChapterScratch,
        commit: ChunkCommit,
    ) -> Result<(), AggregationError> {
        if commit.chapter_id != scratch.chapter_id {
            return Err(AggregationError::ChapterMismatch {
                expected: scratch.chapter_id.clone(),
                got: commit.chapter_id,
            });
        }

        let expected = scratch.next_chunk_index;
        if commit.chunk_index < expected {
            return Err(AggregationError::AlreadyCommitted {
                expected,
                got: commit.chunk_index,
            });
        }
        if commit.chunk_index > expected {
            return Err(AggregationError::OutOfOrder {
                expected,
                got: commit.chunk_index,
            });
        }

        for (id, count) in commit.tally.mentions {
            *scratch.mentions.entry(id).or_insert(0) += count;
        }
        for (id, count) in commit.tally.appearances {
            *scratch.appearances.entry(id).or_insert(0) += count;
        }

        let chapter_id = scratch.chapter_id.clone();
        scratch.evidence.extend(
            commit
                .evidence
                .into_iter()
                .map(|e| e.with_provenance(chapter_id.clone(), commit.chunk_index)),
        );

        scratch.roster = commit.roster;
        scratch.summary = Some(commit.updated_summary);
        scratch.next_chunk_index += 1;
        Ok(())
    }

    /// Fold a finished chapter into the book and consume its scratch.
    pub fn commit_chapter(
        &self,
        book: &mut BookState,
        scratch: ChapterScratch,
    ) -> Result<ChapterTotals, AggregationError> {
        let expected = book
            .chapters
            .get(book.current_chapter_index)
            .map(|c| c.id.clone())
            .unwrap_or_default();
        if scratch.chapter_id != expected || book.completed_chapters.contains(&scratch.chapter_id) {
            return Err(AggregationError::ChapterMismatch {
                expected,
                got: scratch.chapter_id,
            });
        }
        if scratch.has_pending() {
            return Err(AggregationError::IncompleteChapter {
                chapter_id: scratch.chapter_id,
                pending: scratch.pending_chunks.len(),
            });
        }

        let new_characters = scratch.roster.len().saturating_sub(book.roster.len());
        let mentions: u64 = scratch.mentions.values().sum();
        let evidence = scratch.evidence.len();

        for (id, count) in scratch.mentions {
            book.book_mentions
                .entry(id)
                .or_insert_with(MentionTally::default)
                .mentioned_count += count;
        }
        for (id, count) in scratch.appearances {
            *book.book_appearances.entry(id).or_insert(0) += count;
        }
        book.book_evidence.extend(scratch.evidence);
        book.roster = scratch.roster;

        if let Some(summary) = scratch.summary {
            book.chapter_summaries.push(ChapterSummary {
                chapter_id: scratch.chapter_id.clone(),
                summary,
            });
        }
        book.completed_chapters.push(scratch.chapter_id.clone());

        Ok(ChapterTotals {
            chapter_id: scratch.chapter_id,
            chunks: scratch.next_chunk_index,
            mentions,
            evidence,
            new_characters,
        })
    }
}
