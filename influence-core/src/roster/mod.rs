//! Character roster with alias resolution.
//!
//! Names are detected from capitalization alone and resolved against the
//! existing roster in text order:
//!
//! ```text
//! candidate ──normalize──▶ exact alias? ──yes──▶ existing character
//!                               │ no
//!                               ▼
//!                      word containment ≥ threshold? ──yes──▶ existing character
//!                               │ no                          (+ new alias)
//!                               ▼
//!                         new character
//! ```
//!
//! Fuzzy ties go to the longest matching alias, then to the character
//! created first, so a later name always folds into an earlier character.

mod candidate;
mod character;
mod store;

pub use candidate::{detect_candidates, normalize_name, tokenize, Candidate, Token};
pub use character::{Character, CharacterId};
pub use store::{
    AliasConflict, ChunkResolution, EntityRoster, MatchKind, Resolution, RosterConfig,
    DEFAULT_FUZZY_THRESHOLD,
};
