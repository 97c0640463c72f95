//! Testing utilities for book runs.
//!
//! This module provides scripted collaborators for deterministic tests:
//! - `MockAnalyzer` returns scripted evidence and a chunk-counting summary
//! - `MockSynthesizer` ranks characters by mention count
//! - `sample_book` is a small three-chapter book

use crate::analysis::{
    AnalysisError, AnalysisRequest, AnalysisResponse, BookSynthesizer, ChunkAnalyzer, Dossier,
    SynthesisRequest,
};
use crate::evidence::InfluenceEvidence;
use crate::session::AbortHandle;
use crate::state::Chapter;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A scripted analyzer.
///
/// The summary it returns is `{"chapter_id": .., "chunks": n}` where `n`
/// counts the chunks seen so far in the chapter.
#[derive(Default)]
pub struct MockAnalyzer {
    /// Evidence to return, keyed by `(chapter_id, chunk_index)`.
    evidence: HashMap<(String, usize), Vec<InfluenceEvidence>>,
    /// Fail when this chunk is analyzed.
    fail_at: Option<(String, usize, AnalysisError)>,
    /// Request an abort and never answer when this chunk is analyzed.
    abort_at: Option<(String, usize, AbortHandle)>,
    /// Every request received, in order.
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `evidence` for one chunk.
    pub fn with_evidence(
        mut self,
        chapter_id: impl Into<String>,
        chunk_index: usize,
        evidence: Vec<InfluenceEvidence>,
    ) -> Self {
        self.evidence
            .insert((chapter_id.into(), chunk_index), evidence);
        self
    }

    /// Fail with `AnalysisError::Unavailable` at one chunk.
    pub fn failing_at(self, chapter_id: impl Into<String>, chunk_index: usize) -> Self {
        self.failing_with(chapter_id, chunk_index, AnalysisError::Unavailable)
    }

    pub fn failing_with(
        mut self,
        chapter_id: impl Into<String>,
        chunk_index: usize,
        error: AnalysisError,
    ) -> Self {
        self.fail_at = Some((chapter_id.into(), chunk_index, error));
        self
    }

    /// Trigger `handle` while analyzing one chunk, then hang.
    pub fn aborting_at(
        mut self,
        chapter_id: impl Into<String>,
        chunk_index: usize,
        handle: AbortHandle,
    ) -> Self {
        self.abort_at = Some((chapter_id.into(), chunk_index, handle));
        self
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ChunkAnalyzer for MockAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        self.requests.lock().await.push(request.clone());
        let key = (request.chapter_id.clone(), request.chunk_index);

        if let Some((chapter_id, chunk_index, handle)) = &self.abort_at {
            if (chapter_id, chunk_index) == (&key.0, &key.1) {
                handle.abort();
                std::future::pending::<()>().await;
            }
        }
        if let Some((chapter_id, chunk_index, error)) = &self.fail_at {
            if (chapter_id, chunk_index) == (&key.0, &key.1) {
                return Err(error.clone());
            }
        }

        let chunks_seen = request
            .chapter_summary_so_far
            .as_ref()
            .and_then(|summary| summary["chunks"].as_u64())
            .unwrap_or(0);

        Ok(AnalysisResponse {
            evidence: self.evidence.get(&key).cloned().unwrap_or_default(),
            updated_summary: json!({
                "chapter_id": request.chapter_id,
                "chunks": chunks_seen + 1,
            }),
        })
    }
}

/// Ranks characters by mention count, then by id.
#[derive(Default)]
pub struct MockSynthesizer {
    /// Fail instead of ranking.
    pub fail: bool,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookSynthesizer for MockSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<Dossier>, AnalysisError> {
        if self.fail {
            return Err(AnalysisError::Failed("synthesizer offline".to_string()));
        }

        let mut scored: Vec<_> = request
            .roster
            .iter()
            .map(|character| {
                let mentions = request
                    .book_mentions
                    .get(&character.id)
                    .map(|t| t.mentioned_count)
                    .unwrap_or(0);
                (character.id.clone(), mentions)
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (character_id, mentions))| Dossier {
                character_id,
                rank: i as u32 + 1,
                rationale: format!("{mentions} mentions"),
                details: json!({ "mentions": mentions }),
            })
            .collect())
    }
}

/// A three-chapter book with scene breaks and recurring names.
///
/// With the default config it yields three characters: Jon Snow (4 mentions
/// in 4 scenes), Arya Stark (3 in 3) and Sansa Stark (1 in 1).
pub fn sample_book() -> Vec<Chapter> {
    vec![
        Chapter::new(
            "ch1",
            "Jon Snow walked the wall at dusk.\n\n\
             Arya Stark practiced with her sword below.\n\n\
             * * *\n\n\
             Jon watched her until the torches were lit.",
        ),
        Chapter::new(
            "ch2",
            "Arya slipped out through the kitchens.\n\n\
             It had started to snow when Jon found her tracks.",
        ),
        Chapter::new(
            "ch3",
            "Sansa Stark read the letter twice.\n\n\
             ---\n\n\
             Jon and Arya rode south together.",
        ),
    ]
}
