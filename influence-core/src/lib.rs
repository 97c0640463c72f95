//! Chapter-processing state machine for ranking a book's characters by
//! narrative influence.
//!
//! This crate provides:
//! - Lossless scene segmentation and scene-aligned chunking
//! - A character roster with alias detection and resolution
//! - Longest-match mention counting and scene appearance counting
//! - Chapter-granular aggregation that survives analyzer failures and aborts
//! - An explicit router deciding between next chunk, next chapter and finalize
//! - Snapshot persistence for inspecting and resuming runs
//!
//! Evidence extraction, summarization and ranking are external collaborators
//! behind the [`ChunkAnalyzer`] and [`BookSynthesizer`] traits.
//!
//! # Quick Start
//!
//! ```ignore
//! use influence_core::{BookSession, Chapter, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chapters = Chapter::sequential(load_texts()?);
//!     let mut session = BookSession::new(chapters, SessionConfig::from_env(), MyAnalyzer::new())?;
//!
//!     let report = session.run().await;
//!     if report.is_complete() {
//!         for row in session.finalize(&MySynthesizer::new()).await? {
//!             println!("{} {} ({} mentions)", row.rank, row.name, row.mentioned_count);
//!         }
//!     }
//!
//!     session.save("run.json").await?;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod analysis;
pub mod chunk;
pub mod diagnostics;
pub mod evidence;
pub mod mentions;
pub mod persist;
pub mod report;
pub mod roster;
pub mod router;
pub mod scene;
pub mod session;
pub mod state;
pub mod testing;

// Primary public API
pub use aggregate::{AggregationError, ChunkCommit, StateAggregator};
pub use analysis::{
    AnalysisError, AnalysisRequest, AnalysisResponse, BookSynthesizer, ChunkAnalyzer, Dossier,
    SynthesisRequest,
};
pub use chunk::{plan_chunks, SceneChunk, SceneChunker, DEFAULT_MAX_CHUNK_CHARS};
pub use diagnostics::{Diagnostic, DiagnosticLog};
pub use evidence::{EvidenceTotals, EvidenceType, InfluenceEvidence};
pub use mentions::{count_mentions, tally_chunk, ChunkTally};
pub use persist::{BookSnapshot, PersistError};
pub use report::{ChapterFailure, FailureKind, RankedCharacter, RunOutcome, RunReport};
pub use roster::{Character, CharacterId, EntityRoster, RosterConfig};
pub use router::{Action, RouterState};
pub use scene::{segment, Scene, Segmentation};
pub use session::{AbortHandle, BookSession, SessionConfig, SessionError};
pub use state::{BookState, Chapter, ChapterScratch, InputError, MentionTally};
pub use testing::{MockAnalyzer, MockSynthesizer};
