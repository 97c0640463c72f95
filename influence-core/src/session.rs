//! BookSession - the driver for a run over a book.
//!
//! The session exclusively owns the [`BookState`] and advances it one chunk
//! at a time, strictly in chapter and chunk order. Collaborators see owned
//! snapshots only. A chapter's effects reach the book in a single commit once
//! its last chunk is done; a failed or aborted chapter is dropped whole.

use crate::aggregate::{AggregationError, ChunkCommit, StateAggregator};
use crate::analysis::{AnalysisError, AnalysisRequest, BookSynthesizer, ChunkAnalyzer, SynthesisRequest};
use crate::chunk::DEFAULT_MAX_CHUNK_CHARS;
use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::mentions::tally_chunk;
use crate::persist::{BookSnapshot, PersistError};
use crate::report::{rank_characters, ChapterFailure, FailureKind, RankedCharacter, RunOutcome, RunReport};
use crate::roster::RosterConfig;
use crate::router::{Action, RouteError, RouterState};
use crate::state::{validate_chapters, BookState, Chapter, ChapterScratch, InputError};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from BookSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Chapter '{chapter_id}' failed at chunk {chunk_index}: {source}")]
    Analysis {
        chapter_id: String,
        chunk_index: usize,
        #[source]
        source: AnalysisError,
    },

    #[error("Chapter '{chapter_id}' aggregation failed: {source}")]
    Aggregation {
        chapter_id: String,
        #[source]
        source: AggregationError,
    },

    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    #[error("Synthesis failed: {0}")]
    Synthesis(#[source] AnalysisError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Snapshot does not match the book: {0}")]
    InvalidSnapshot(String),

    #[error("Run aborted")]
    Aborted,

    #[error("Chapter '{chapter_id}' failed; the run is halted")]
    Halted { chapter_id: String },

    #[error("Book is not finished")]
    NotFinished,

    #[error("Book is already finished")]
    AlreadyFinished,
}

/// Configuration for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Chunk budget in characters.
    pub max_chunk_chars: usize,

    /// Split scenes longer than this at line breaks.
    pub max_scene_chars: Option<usize>,

    /// Name detection and alias resolution.
    pub roster: RosterConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            max_scene_chars: None,
            roster: RosterConfig::default(),
        }
    }
}

/// Read an optional setting, keeping `default` when it is missing or unparsable.
fn parse_setting<T: FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(setting = name, value = %raw, "ignoring unparsable setting");
                default
            }
        },
        None => default,
    }
}

impl SessionConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from the environment.
    ///
    /// `SCENE_CHUNK_MAX_CHARS`, `SCENE_MAX_CHARS`, `ALIAS_FUZZY_THRESHOLD`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_chunk_chars = parse_setting(
            "SCENE_CHUNK_MAX_CHARS",
            lookup("SCENE_CHUNK_MAX_CHARS"),
            defaults.max_chunk_chars,
        );
        let max_scene_chars = lookup("SCENE_MAX_CHARS")
            .map(|raw| parse_setting("SCENE_MAX_CHARS", Some(raw), 0usize))
            .filter(|max| *max > 0);
        let fuzzy_threshold = parse_setting(
            "ALIAS_FUZZY_THRESHOLD",
            lookup("ALIAS_FUZZY_THRESHOLD"),
            defaults.roster.fuzzy_threshold,
        );

        Self {
            max_chunk_chars,
            max_scene_chars,
            roster: RosterConfig {
                fuzzy_threshold,
                ..defaults.roster
            },
        }
        .sanitized()
    }

    /// Clamp values to usable ranges.
    fn sanitized(mut self) -> Self {
        if self.max_chunk_chars == 0 {
            warn!("chunk budget of 0 replaced with default");
            self.max_chunk_chars = DEFAULT_MAX_CHUNK_CHARS;
        }
        if !(0.0..=1.0).contains(&self.roster.fuzzy_threshold) {
            warn!(
                threshold = self.roster.fuzzy_threshold,
                "fuzzy threshold out of range, clamping"
            );
            self.roster.fuzzy_threshold = self.roster.fuzzy_threshold.clamp(0.0, 1.0);
        }
        self
    }

    /// Set the chunk budget in characters.
    pub fn with_max_chunk_chars(mut self, max: usize) -> Self {
        self.max_chunk_chars = max;
        self
    }

    /// Split scenes longer than `max` characters at line breaks.
    pub fn with_max_scene_chars(mut self, max: usize) -> Self {
        self.max_scene_chars = Some(max);
        self
    }

    /// Set the minimum confidence for fuzzy alias matches.
    pub fn with_fuzzy_threshold(mut self, threshold: f32) -> Self {
        self.roster.fuzzy_threshold = threshold;
        self
    }

    /// Ignore name candidates shorter than `chars`.
    pub fn with_min_candidate_chars(mut self, chars: usize) -> Self {
        self.roster.min_candidate_chars = chars;
        self
    }

    /// Words that never form part of a name.
    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roster
            .extra_stopwords
            .extend(words.into_iter().map(|w| w.into().to_lowercase()));
        self
    }
}

/// Requests an abort from any task.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Ask the session to stop. The in-flight chapter is discarded.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once an abort is requested.
    pub async fn aborted(&self) {
        let mut receiver = self.sender.subscribe();
        let closed = receiver.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

/// A run over one book.
pub struct BookSession<A: ChunkAnalyzer> {
    run_id: Uuid,
    config: SessionConfig,
    state: BookState,
    router: RouterState,
    aggregator: StateAggregator,
    analyzer: A,
    diagnostics: DiagnosticLog,
    abort: AbortHandle,
    failure: Option<ChapterFailure>,
}

impl<A: ChunkAnalyzer> BookSession<A> {
    /// Validate the chapters and prepare a run starting at chapter 0.
    pub fn new(chapters: Vec<Chapter>, config: SessionConfig, analyzer: A) -> Result<Self, SessionError> {
        let state = BookState::new(chapters)?;
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, chapters = state.chapters.len(), "book session created");

        Ok(Self {
            run_id,
            config,
            state,
            router: RouterState::start(),
            aggregator: StateAggregator::new(),
            analyzer,
            diagnostics: DiagnosticLog::new(),
            abort: AbortHandle::new(),
            failure: None,
        })
    }

    /// Continue a run from a snapshot.
    ///
    /// Work is resumed at chapter granularity: any chapter scratch in the
    /// snapshot is discarded and the first uncommitted chapter runs again.
    pub fn resume(snapshot: BookSnapshot, config: SessionConfig, analyzer: A) -> Result<Self, SessionError> {
        let BookSnapshot {
            run_id,
            mut state,
            diagnostics,
            ..
        } = snapshot;

        validate_chapters(&state.chapters)?;
        let done = state.completed_chapters.len();
        if done > state.chapters.len() {
            return Err(SessionError::InvalidSnapshot(format!(
                "{done} chapters completed but the book has {}",
                state.chapters.len()
            )));
        }
        for (chapter, completed) in state.chapters.iter().zip(&state.completed_chapters) {
            if &chapter.id != completed {
                return Err(SessionError::InvalidSnapshot(format!(
                    "completed chapter '{completed}' is out of order (expected '{}')",
                    chapter.id
                )));
            }
        }

        state.scratch = None;
        let router = if done == state.chapters.len() {
            state.current_chapter_index = done.saturating_sub(1);
            RouterState::BookDone
        } else {
            state.current_chapter_index = done;
            RouterState::ProcessingChunk { chapter_index: done }
        };
        info!(run_id = %run_id, completed = done, "book session resumed");

        Ok(Self {
            run_id,
            config,
            state,
            router,
            aggregator: StateAggregator::new(),
            analyzer,
            diagnostics,
            abort: AbortHandle::new(),
            failure: None,
        })
    }

    /// Share an existing abort handle with this session.
    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = handle;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read-only view of the book state.
    pub fn state(&self) -> &BookState {
        &self.state
    }

    pub fn router_state(&self) -> RouterState {
        self.router
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Whether every chapter has been committed.
    pub fn is_finished(&self) -> bool {
        self.router == RouterState::BookDone
    }

    fn chapter_id(&self, chapter_index: usize) -> String {
        self.state
            .chapters
            .get(chapter_index)
            .map(|c| c.id.clone())
            .unwrap_or_default()
    }

    /// Segment and chunk a chapter into fresh scratch.
    fn load_chapter(&mut self, chapter_index: usize) {
        let Some(chapter) = self.state.chapters.get(chapter_index) else {
            return;
        };
        let scratch = ChapterScratch::load(
            chapter,
            chapter_index,
            &self.state.roster,
            self.config.max_chunk_chars,
            self.config.max_scene_chars,
        );

        if let Some(reason) = scratch.segmentation_fallback {
            self.diagnostics.record(Diagnostic::SegmentationFallback {
                chapter_id: scratch.chapter_id.clone(),
                reason,
            });
        }
        for chunk in &scratch.pending_chunks {
            if chunk.is_oversized(self.config.max_chunk_chars) {
                self.diagnostics.record(Diagnostic::ChunkOverflow {
                    chapter_id: scratch.chapter_id.clone(),
                    chunk_index: chunk.index,
                    scene_index: chunk.first_scene().unwrap_or(0),
                    char_count: chunk.char_count,
                    budget: self.config.max_chunk_chars,
                });
            }
        }

        info!(
            chapter_id = %scratch.chapter_id,
            chapter_index,
            scenes = scratch.scenes.len(),
            chunks = scratch.chunk_count(),
            "chapter loaded"
        );
        self.state.current_chapter_index = chapter_index;
        self.state.scratch = Some(scratch);
    }

    /// Drop the chapter in progress and halt the run.
    fn fail_chapter(&mut self, chapter_index: usize, chunk_index: Option<usize>, kind: FailureKind, reason: String) {
        let chapter_id = self.chapter_id(chapter_index);
        warn!(
            chapter_id = %chapter_id,
            chunk_index = ?chunk_index,
            kind = ?kind,
            reason = %reason,
            "chapter failed, discarding its scratch"
        );

        self.state.scratch = None;
        if kind != FailureKind::Aborted {
            if let Ok(halted) = self.router.halt() {
                self.router = halted;
            }
        }
        self.failure = Some(ChapterFailure {
            chapter_id,
            chapter_index,
            chunk_index,
            kind,
            reason,
        });
    }

    fn abort_chapter(&mut self, chapter_index: usize, chunk_index: Option<usize>) -> SessionError {
        self.fail_chapter(
            chapter_index,
            chunk_index,
            FailureKind::Aborted,
            "abort requested".to_string(),
        );
        SessionError::Aborted
    }

    /// Process the next chunk and return what the router decided.
    pub async fn step(&mut self) -> Result<Action, SessionError> {
        let chapter_index = match self.router {
            RouterState::ProcessingChunk { chapter_index } => chapter_index,
            RouterState::BookDone => return Err(SessionError::AlreadyFinished),
            RouterState::Halted { chapter_index } => {
                return Err(SessionError::Halted {
                    chapter_id: self.chapter_id(chapter_index),
                })
            }
            RouterState::ChapterDone { .. } => {
                return Err(RouteError::InvalidTransition {
                    state: self.router,
                    event: "step",
                }
                .into())
            }
        };

        if self.abort.is_aborted() {
            return Err(self.abort_chapter(chapter_index, None));
        }
        if self.state.scratch.is_none() {
            self.load_chapter(chapter_index);
        }

        // Resolve and count against a copy of the chapter's roster, one scene
        // at a time so no name spans a scene break.
        let (commit, request, conflicts) = {
            let Some(scratch) = self.state.scratch.as_ref() else {
                return Err(RouteError::InvalidTransition {
                    state: self.router,
                    event: "chapter out of range",
                }
                .into());
            };
            let Some(chunk) = scratch.pending_chunks.front() else {
                return Err(RouteError::InvalidTransition {
                    state: self.router,
                    event: "empty chunk queue",
                }
                .into());
            };

            let mut roster = scratch.roster.clone();
            let scene_texts = chunk
                .scene_indices
                .iter()
                .filter_map(|&i| scratch.scenes.get(i))
                .map(|scene| scene.text.as_str());
            let resolution = roster.resolve_texts(scene_texts, &self.config.roster);
            let conflicts: Vec<Diagnostic> = resolution
                .conflicts()
                .map(|conflict| Diagnostic::alias_conflict(&scratch.chapter_id, chunk.index, conflict))
                .collect();
            let tally = tally_chunk(chunk, &scratch.scenes, &roster);
            debug!(
                chapter_id = %scratch.chapter_id,
                chunk_index = chunk.index,
                scenes = chunk.scene_indices.len(),
                chars = chunk.char_count,
                created = resolution.created().len(),
                new_aliases = resolution.new_aliases().len(),
                mentions = tally.mentions.values().sum::<u64>(),
                "chunk resolved"
            );

            let request = AnalysisRequest {
                chapter_id: scratch.chapter_id.clone(),
                chunk_index: chunk.index,
                chunk_text: chunk.text.clone(),
                roster_snapshot: roster.alias_snapshot(),
                chapter_summary_so_far: scratch.summary.clone(),
            };
            let commit = ChunkCommit {
                chapter_id: scratch.chapter_id.clone(),
                chunk_index: chunk.index,
                roster,
                tally,
                evidence: Vec::new(),
                updated_summary: serde_json::Value::Null,
            };
            (commit, request, conflicts)
        };

        let chunk_index = commit.chunk_index;
        let outcome = tokio::select! {
            biased;
            _ = self.abort.aborted() => None,
            response = self.analyzer.analyze(request) => Some(response),
        };

        let response = match outcome {
            None => return Err(self.abort_chapter(chapter_index, Some(chunk_index))),
            Some(Err(source)) => {
                self.fail_chapter(
                    chapter_index,
                    Some(chunk_index),
                    FailureKind::Analysis,
                    source.to_string(),
                );
                return Err(SessionError::Analysis {
                    chapter_id: commit.chapter_id,
                    chunk_index,
                    source,
                });
            }
            Some(Ok(response)) => response,
        };

        let commit = ChunkCommit {
            evidence: response.evidence,
            updated_summary: response.updated_summary,
            ..commit
        };
        let chapter_id = commit.chapter_id.clone();
        let committed = match self.state.scratch.as_mut() {
            Some(scratch) => {
                scratch.pending_chunks.pop_front();
                self.aggregator
                    .commit_chunk(scratch, commit)
                    .map(|()| scratch.pending_chunks.len())
            }
            None => Err(AggregationError::ChapterMismatch {
                expected: String::new(),
                got: chapter_id.clone(),
            }),
        };
        let pending = match committed {
            Ok(pending) => pending,
            Err(source) => return Err(self.aggregation_failed(chapter_index, Some(chunk_index), source)),
        };
        // Conflicts are only reported for chunks that made it into scratch.
        for conflict in conflicts {
            self.diagnostics.record(conflict);
        }

        let (action, next) = self.router.after_commit(pending, self.state.chapters.len())?;
        debug!(chapter_id = %chapter_id, chunk_index, action = ?action, "chunk committed");

        if action != Action::NextChunk {
            let Some(scratch) = self.state.scratch.take() else {
                return Err(self.aggregation_failed(
                    chapter_index,
                    None,
                    AggregationError::IncompleteChapter {
                        chapter_id,
                        pending: 0,
                    },
                ));
            };
            let totals = match self.aggregator.commit_chapter(&mut self.state, scratch) {
                Ok(totals) => totals,
                Err(source) => return Err(self.aggregation_failed(chapter_index, None, source)),
            };
            info!(
                chapter_id = %totals.chapter_id,
                chunks = totals.chunks,
                mentions = totals.mentions,
                evidence = totals.evidence,
                new_characters = totals.new_characters,
                characters = self.state.roster.len(),
                "chapter committed"
            );
        }

        self.router = next;
        match action {
            Action::NextChapter => {
                self.router = self.router.enter_next_chapter()?;
                self.load_chapter(chapter_index + 1);
            }
            Action::Finalize => {
                info!(
                    run_id = %self.run_id,
                    chapters = self.state.completed_chapters.len(),
                    characters = self.state.roster.len(),
                    "book finished"
                );
            }
            Action::NextChunk => {}
        }

        Ok(action)
    }

    fn aggregation_failed(
        &mut self,
        chapter_index: usize,
        chunk_index: Option<usize>,
        source: AggregationError,
    ) -> SessionError {
        self.fail_chapter(
            chapter_index,
            chunk_index,
            FailureKind::Aggregation,
            source.to_string(),
        );
        SessionError::Aggregation {
            chapter_id: self.chapter_id(chapter_index),
            source,
        }
    }

    /// Process chunks until the book is finished, a chapter fails, or an
    /// abort is requested.
    pub async fn run(&mut self) -> RunReport {
        loop {
            match self.step().await {
                Ok(Action::Finalize) => break,
                Ok(_) => {}
                Err(err) => {
                    debug!(error = %err, "run stopped");
                    break;
                }
            }
        }
        self.report()
    }

    /// Where the run stands.
    pub fn report(&self) -> RunReport {
        let outcome = match (self.router, &self.failure) {
            (RouterState::BookDone, _) => RunOutcome::Completed,
            (RouterState::Halted { .. }, _) => RunOutcome::ChapterFailed,
            (_, Some(failure)) if failure.kind == FailureKind::Aborted => RunOutcome::Aborted,
            _ => RunOutcome::InProgress,
        };

        let not_attempted = match outcome {
            RunOutcome::Completed => Vec::new(),
            _ => self.state.remaining_chapter_ids(),
        };

        RunReport {
            run_id: self.run_id,
            outcome,
            completed_chapters: self.state.completed_chapters.clone(),
            failed_chapter: match outcome {
                RunOutcome::Completed => None,
                _ => self.failure.clone(),
            },
            not_attempted,
            diagnostics: self.diagnostics.entries().to_vec(),
        }
    }

    /// Ask the synthesizer for dossiers and join them with the tallies.
    pub async fn finalize<S>(&self, synthesizer: &S) -> Result<Vec<RankedCharacter>, SessionError>
    where
        S: BookSynthesizer + ?Sized,
    {
        if !self.is_finished() {
            return Err(SessionError::NotFinished);
        }

        let request = SynthesisRequest {
            book_mentions: self.state.book_mentions.clone(),
            book_appearances: self.state.book_appearances.clone(),
            book_evidence: self.state.book_evidence.clone(),
            chapter_summaries: self.state.chapter_summaries.clone(),
            roster: self.state.roster.characters().to_vec(),
        };
        let dossiers = synthesizer
            .synthesize(request)
            .await
            .map_err(SessionError::Synthesis)?;
        info!(dossiers = dossiers.len(), "book synthesized");

        Ok(rank_characters(&self.state, dossiers))
    }

    /// Snapshot of the run for saving.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot::new(self.run_id, self.state.clone(), self.diagnostics.clone())
    }

    /// Save a snapshot as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        self.snapshot().save_json(path).await?;
        Ok(())
    }
}
