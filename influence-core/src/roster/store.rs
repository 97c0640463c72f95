//! The character registry and alias resolution.

use super::candidate::{detect_candidates, is_title, name_words, normalize_name, Candidate};
use super::character::{Character, CharacterId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Default minimum confidence for a fuzzy alias match.
pub const DEFAULT_FUZZY_THRESHOLD: f32 = 0.75;

/// Confidence when the candidate's words open a longer name (first name).
const PREFIX_CONFIDENCE: f32 = 0.9;

/// Confidence when the candidate's words close a longer name (surname).
const SUFFIX_CONFIDENCE: f32 = 0.8;

/// Confidence when the candidate's words sit inside a longer name.
const INTERIOR_CONFIDENCE: f32 = 0.6;

/// Settings for candidate detection and alias resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Minimum confidence for a fuzzy match to resolve to an existing character.
    pub fuzzy_threshold: f32,
    /// Candidates shorter than this (in characters) are ignored.
    pub min_candidate_chars: usize,
    /// Additional lowercase words that never start or continue a name.
    pub extra_stopwords: Vec<String>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            min_candidate_chars: 2,
            extra_stopwords: Vec::new(),
        }
    }
}

/// How a candidate was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MatchKind {
    /// The candidate is already an alias.
    Exact,
    /// The candidate overlaps an alias of an existing character.
    Fuzzy { confidence: f32 },
    /// No match; a new character was created.
    Created,
}

/// More than one character qualified for a fuzzy match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasConflict {
    /// Normalized candidate.
    pub candidate: String,
    /// The character the tie-break chose.
    pub chosen: CharacterId,
    /// The other characters that qualified, best first.
    pub contenders: Vec<CharacterId>,
}

/// Outcome of resolving one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub surface: String,
    pub normalized: String,
    pub character_id: CharacterId,
    pub kind: MatchKind,
    /// Whether the candidate was added as a new alias.
    pub alias_added: bool,
    pub conflict: Option<AliasConflict>,
}

/// Outcome of resolving every candidate in a chunk, in text order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkResolution {
    pub resolutions: Vec<Resolution>,
}

impl ChunkResolution {
    /// Characters created while resolving this chunk.
    pub fn created(&self) -> Vec<&CharacterId> {
        self.resolutions
            .iter()
            .filter(|r| r.kind == MatchKind::Created)
            .map(|r| &r.character_id)
            .collect()
    }

    /// Ambiguous candidates settled by tie-break.
    pub fn conflicts(&self) -> impl Iterator<Item = &AliasConflict> {
        self.resolutions.iter().filter_map(|r| r.conflict.as_ref())
    }

    /// Aliases added to existing characters, as `(character, alias)`.
    pub fn new_aliases(&self) -> Vec<(&CharacterId, &str)> {
        self.resolutions
            .iter()
            .filter(|r| r.alias_added)
            .map(|r| (&r.character_id, r.normalized.as_str()))
            .collect()
    }
}

/// A fuzzy match candidate during resolution.
struct FuzzyMatch {
    character_id: CharacterId,
    confidence: f32,
    alias_chars: usize,
    created_order: usize,
}

/// How strongly a shorter name is contained in a longer one, by whole words.
fn containment_confidence(a: &[&str], b: &[&str]) -> Option<f32> {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.is_empty() || shorter.len() == longer.len() {
        return None;
    }
    // "lord" alone says nothing about which lord.
    if shorter.iter().all(|w| is_title(w)) {
        return None;
    }

    let width = shorter.len();
    let position = longer.windows(width).position(|window| window == shorter)?;

    Some(if position == 0 {
        PREFIX_CONFIDENCE
    } else if position + width == longer.len() {
        SUFFIX_CONFIDENCE
    } else {
        INTERIOR_CONFIDENCE
    })
}

/// The roster of canonical characters.
///
/// Every alias maps to exactly one character. Characters are never removed
/// and aliases are only ever added. On load the alias index is rebuilt from
/// the characters, so a saved index is never trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SavedRoster")]
pub struct EntityRoster {
    /// Characters in creation order.
    characters: Vec<Character>,
    /// Normalized alias to owning character.
    alias_index: BTreeMap<String, CharacterId>,
    /// Number of characters ever created.
    created: u32,
}

/// The serialized form of a roster. Only the characters are authoritative.
#[derive(Deserialize)]
struct SavedRoster {
    #[serde(default)]
    characters: Vec<Character>,
    #[serde(default)]
    created: u32,
}

impl From<SavedRoster> for EntityRoster {
    fn from(saved: SavedRoster) -> Self {
        let mut alias_index = BTreeMap::new();
        let mut characters = Vec::with_capacity(saved.characters.len());
        let mut highest = 0;

        for mut character in saved.characters {
            if characters.iter().any(|c: &Character| c.id == character.id) {
                continue;
            }
            // An alias claimed by an earlier character stays with it.
            character
                .aliases
                .retain(|alias| !alias.is_empty() && !alias_index.contains_key(alias));
            for alias in &character.aliases {
                alias_index.insert(alias.clone(), character.id.clone());
            }
            highest = highest.max(character.id.sequence().unwrap_or(0));
            characters.push(character);
        }

        let created = saved.created.max(highest).max(characters.len() as u32);
        Self {
            characters,
            alias_index,
            created,
        }
    }
}

impl EntityRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// All characters, in creation order.
    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    /// Get a character by ID.
    pub fn get(&self, id: &CharacterId) -> Option<&Character> {
        self.characters.iter().find(|c| &c.id == id)
    }

    /// Find the character owning an alias (case-insensitive exact match).
    pub fn find_by_alias(&self, name: &str) -> Option<&Character> {
        self.alias_index
            .get(&normalize_name(name))
            .and_then(|id| self.get(id))
    }

    /// Read-only copy of the alias mapping.
    pub fn alias_snapshot(&self) -> BTreeMap<String, CharacterId> {
        self.alias_index.clone()
    }

    /// Iterate over `(alias, character)` pairs.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &CharacterId)> {
        self.alias_index.iter().map(|(alias, id)| (alias.as_str(), id))
    }

    /// Register a character directly, with extra aliases.
    ///
    /// If the name is already an alias, its owner is reused. Aliases already
    /// owned by another character are skipped.
    pub fn register(&mut self, canonical_name: &str, aliases: &[&str]) -> CharacterId {
        let id = match self.alias_index.get(&normalize_name(canonical_name)) {
            Some(owner) => owner.clone(),
            None => self.create(canonical_name),
        };
        for alias in aliases {
            self.attach_alias(&id, normalize_name(alias));
        }
        id
    }

    fn create(&mut self, canonical_name: &str) -> CharacterId {
        self.created += 1;
        let id = CharacterId::sequential(self.created);
        let character = Character::new(id.clone(), canonical_name);
        for alias in &character.aliases {
            self.alias_index
                .entry(alias.clone())
                .or_insert_with(|| id.clone());
        }
        self.characters.push(character);
        id
    }

    /// Add an alias to a character unless some character already owns it.
    fn attach_alias(&mut self, id: &CharacterId, alias: String) -> bool {
        if alias.is_empty() || self.alias_index.contains_key(&alias) {
            return false;
        }
        let Some(character) = self.characters.iter_mut().find(|c| &c.id == id) else {
            return false;
        };
        character.aliases.insert(alias.clone());
        self.alias_index.insert(alias, id.clone());
        true
    }

    fn fuzzy_matches(&self, words: &[&str]) -> Vec<FuzzyMatch> {
        let mut matches = Vec::new();
        for (created_order, character) in self.characters.iter().enumerate() {
            // A character that already has a name this long is a different
            // person from a longer candidate: "Jon Arryn" is not "Jon Snow".
            let has_full_name = character
                .aliases
                .iter()
                .any(|alias| name_words(alias).len() >= words.len());

            let best = character
                .aliases
                .iter()
                .filter_map(|alias| {
                    let alias_words = name_words(alias);
                    if words.len() > alias_words.len() && has_full_name {
                        return None;
                    }
                    let confidence = containment_confidence(words, &alias_words)?;
                    Some((confidence, alias.chars().count()))
                })
                .max_by(|a, b| {
                    a.0.partial_cmp(&b.0)
                        .unwrap_or(Ordering::Equal)
                        .then(a.1.cmp(&b.1))
                });

            if let Some((confidence, alias_chars)) = best {
                matches.push(FuzzyMatch {
                    character_id: character.id.clone(),
                    confidence,
                    alias_chars,
                    created_order,
                });
            }
        }
        matches
    }

    /// Resolve one candidate name to a character, creating one if needed.
    ///
    /// Returns `None` if the name normalizes to nothing.
    pub fn resolve_name(&mut self, surface: &str, config: &RosterConfig) -> Option<Resolution> {
        let normalized = normalize_name(surface);
        if normalized.is_empty() {
            return None;
        }
        Some(self.resolve_normalized(surface.trim().to_string(), normalized, config))
    }

    fn resolve_normalized(
        &mut self,
        surface: String,
        normalized: String,
        config: &RosterConfig,
    ) -> Resolution {
        if let Some(id) = self.alias_index.get(&normalized) {
            return Resolution {
                surface,
                normalized,
                character_id: id.clone(),
                kind: MatchKind::Exact,
                alias_added: false,
                conflict: None,
            };
        }

        let words = name_words(&normalized);
        let mut matches: Vec<FuzzyMatch> = self
            .fuzzy_matches(&words)
            .into_iter()
            .filter(|m| m.confidence >= config.fuzzy_threshold)
            .collect();

        // Highest confidence, then longest alias, then earliest created.
        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then(b.alias_chars.cmp(&a.alias_chars))
                .then(a.created_order.cmp(&b.created_order))
        });

        let mut ranked = matches.into_iter();
        match ranked.next() {
            Some(best) => {
                let contenders: Vec<CharacterId> = ranked.map(|m| m.character_id).collect();
                let conflict = (!contenders.is_empty()).then(|| AliasConflict {
                    candidate: normalized.clone(),
                    chosen: best.character_id.clone(),
                    contenders,
                });
                let alias_added = self.attach_alias(&best.character_id, normalized.clone());
                Resolution {
                    surface,
                    normalized,
                    character_id: best.character_id,
                    kind: MatchKind::Fuzzy {
                        confidence: best.confidence,
                    },
                    alias_added,
                    conflict,
                }
            }
            None => {
                let character_id = self.create(&surface);
                Resolution {
                    surface,
                    normalized,
                    character_id,
                    kind: MatchKind::Created,
                    alias_added: false,
                    conflict: None,
                }
            }
        }
    }

    fn resolve_candidate(&mut self, candidate: Candidate, config: &RosterConfig) -> Resolution {
        self.resolve_normalized(candidate.surface, candidate.normalized, config)
    }

    /// Detect every name-like span in `text` and resolve each, in text order.
    ///
    /// Later candidates see the characters and aliases created by earlier
    /// ones. Calling this twice for the same chunk counts its names twice;
    /// callers are responsible for not re-submitting a committed chunk.
    pub fn resolve_chunk(&mut self, text: &str, config: &RosterConfig) -> ChunkResolution {
        let candidates = detect_candidates(text, config.min_candidate_chars, &config.extra_stopwords);
        let resolutions = candidates
            .into_iter()
            .map(|candidate| self.resolve_candidate(candidate, config))
            .collect();
        ChunkResolution { resolutions }
    }

    /// Resolve each text separately, in order, so no name spans two texts.
    pub fn resolve_texts<'t>(
        &mut self,
        texts: impl IntoIterator<Item = &'t str>,
        config: &RosterConfig,
    ) -> ChunkResolution {
        let mut resolution = ChunkResolution::default();
        for text in texts {
            resolution
                .resolutions
                .extend(self.resolve_chunk(text, config).resolutions);
        }
        resolution
    }
}
