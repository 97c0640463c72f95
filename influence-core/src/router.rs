//! Chapter routing state machine.
//!
//! ```text
//!                 pending chunks
//!                   ┌────────┐
//!                   ▼        │
//!   Init ──▶ ProcessingChunk(i) ──no pending, i+1 < n──▶ ChapterDone(i) ──▶ ProcessingChunk(i+1)
//!                   │    │
//!                   │    └──no pending, last chapter──▶ BookDone
//!                   └──chapter failed──▶ Halted(i)
//! ```
//!
//! Transitions are pure functions of the pending-chunk count and chapter
//! position, so the machine can be tested without a session.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the driver should do after a chunk commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NextChunk,
    NextChapter,
    Finalize,
}

/// Where the machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RouterState {
    ProcessingChunk { chapter_index: usize },
    /// The chapter's aggregates are committed; the next chapter is not loaded yet.
    ChapterDone { chapter_index: usize },
    /// The chapter failed. Terminal.
    Halted { chapter_index: usize },
    /// Terminal.
    BookDone,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("No transition from {state:?} on {event}")]
    InvalidTransition { state: RouterState, event: &'static str },
}

/// Decide the next action from the pending chunks and chapter position.
pub fn next_action(pending_chunks: usize, chapter_index: usize, chapter_count: usize) -> Action {
    if pending_chunks > 0 {
        Action::NextChunk
    } else if chapter_index + 1 < chapter_count {
        Action::NextChapter
    } else {
        Action::Finalize
    }
}

impl RouterState {
    /// Initial state: processing chapter 0.
    pub fn start() -> Self {
        RouterState::ProcessingChunk { chapter_index: 0 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RouterState::Halted { .. } | RouterState::BookDone)
    }

    pub fn chapter_index(&self) -> Option<usize> {
        match self {
            RouterState::ProcessingChunk { chapter_index }
            | RouterState::ChapterDone { chapter_index }
            | RouterState::Halted { chapter_index } => Some(*chapter_index),
            RouterState::BookDone => None,
        }
    }

    /// Transition after a chunk commits.
    pub fn after_commit(
        self,
        pending_chunks: usize,
        chapter_count: usize,
    ) -> Result<(Action, RouterState), RouteError> {
        let RouterState::ProcessingChunk { chapter_index } = self else {
            return Err(RouteError::InvalidTransition {
                state: self,
                event: "chunk commit",
            });
        };

        let action = next_action(pending_chunks, chapter_index, chapter_count);
        let next = match action {
            Action::NextChunk => self,
            Action::NextChapter => RouterState::ChapterDone { chapter_index },
            Action::Finalize => RouterState::BookDone,
        };
        Ok((action, next))
    }

    /// Re-enter chunk processing once the next chapter's scratch is loaded.
    pub fn enter_next_chapter(self) -> Result<RouterState, RouteError> {
        match self {
            RouterState::ChapterDone { chapter_index } => Ok(RouterState::ProcessingChunk {
                chapter_index: chapter_index + 1,
            }),
            state => Err(RouteError::InvalidTransition {
                state,
                event: "next chapter",
            }),
        }
    }

    /// Stop processing after a chapter failure.
    pub fn halt(self) -> Result<RouterState, RouteError> {
        match self {
            RouterState::ProcessingChunk { chapter_index } => {
                Ok(RouterState::Halted { chapter_index })
            }
            state => Err(RouteError::InvalidTransition {
                state,
                event: "halt",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_chunks_single_chapter() {
        let mut state = RouterState::start();
        let mut actions = Vec::new();

        for pending in [2, 1, 0] {
            let (action, next) = state.after_commit(pending, 1).unwrap();
            actions.push(action);
            state = next;
        }

        assert_eq!(
            actions,
            vec![Action::NextChunk, Action::NextChunk, Action::Finalize]
        );
        assert_eq!(state, RouterState::BookDone);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_advances_through_chapters() {
        let state = RouterState::start();
        let (action, state) = state.after_commit(0, 3).unwrap();
        assert_eq!(action, Action::NextChapter);
        assert_eq!(state, RouterState::ChapterDone { chapter_index: 0 });

        let state = state.enter_next_chapter().unwrap();
        assert_eq!(state, RouterState::ProcessingChunk { chapter_index: 1 });
    }

    #[test]
    fn test_next_action_table() {
        assert_eq!(next_action(3, 0, 1), Action::NextChunk);
        assert_eq!(next_action(1, 4, 5), Action::NextChunk);
        assert_eq!(next_action(0, 0, 2), Action::NextChapter);
        assert_eq!(next_action(0, 3, 5), Action::NextChapter);
        assert_eq!(next_action(0, 4, 5), Action::Finalize);
    }

    #[test]
    fn test_terminal_states_reject_events() {
        assert!(RouterState::BookDone.after_commit(0, 1).is_err());
        assert!(RouterState::BookDone.enter_next_chapter().is_err());

        let halted = RouterState::start().halt().unwrap();
        assert_eq!(halted, RouterState::Halted { chapter_index: 0 });
        assert!(halted.after_commit(1, 2).is_err());
        assert!(halted.halt().is_err());
    }

    #[test]
    fn test_chapter_done_requires_reentry() {
        let (_, state) = RouterState::start().after_commit(0, 2).unwrap();
        assert!(state.after_commit(0, 2).is_err());
    }
}
