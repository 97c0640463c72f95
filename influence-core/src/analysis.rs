//! Contracts for the external analysis collaborators.
//!
//! The analyzer extracts influence evidence and a running chapter summary
//! from each chunk. The synthesizer turns book-level aggregates into ranked
//! dossiers once every chapter is committed. Both receive owned snapshots,
//! never references into live state.

use crate::evidence::InfluenceEvidence;
use crate::roster::{Character, CharacterId};
use crate::state::{ChapterSummary, MentionTally};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure reported by a collaborator after its own retries are exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Analysis failed: {0}")]
    Failed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Analysis service unavailable")]
    Unavailable,
}

/// Per-chunk request to the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub chapter_id: String,
    pub chunk_index: usize,
    pub chunk_text: String,
    /// Alias to character id, after this chunk's names were resolved.
    pub roster_snapshot: BTreeMap<String, CharacterId>,
    /// The summary returned for the previous chunk of this chapter.
    pub chapter_summary_so_far: Option<Value>,
}

/// The analyzer's reply for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default)]
    pub evidence: Vec<InfluenceEvidence>,
    pub updated_summary: Value,
}

/// Extracts evidence and summaries from chunks.
#[async_trait]
pub trait ChunkAnalyzer: Send + Sync {
    /// Analyze one chunk.
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

/// Book-level request to the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub book_mentions: BTreeMap<CharacterId, MentionTally>,
    pub book_appearances: BTreeMap<CharacterId, u64>,
    pub book_evidence: Vec<InfluenceEvidence>,
    pub chapter_summaries: Vec<ChapterSummary>,
    pub roster: Vec<Character>,
}

/// One character's ranking from the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dossier {
    pub character_id: CharacterId,
    /// 1 is most influential.
    pub rank: u32,
    pub rationale: String,
    /// Anything else the synthesizer produced.
    #[serde(default)]
    pub details: Value,
}

/// Produces ranked dossiers for the whole book.
#[async_trait]
pub trait BookSynthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<Vec<Dossier>, AnalysisError>;
}
