//! Mention and appearance counting.
//!
//! Aliases are matched word by word, case-insensitively. At each position
//! the longest alias wins and its words are consumed, so "Jon Snow" counts
//! once even when "Jon" and "Snow" are aliases too.

use crate::chunk::SceneChunk;
use crate::roster::{tokenize, CharacterId, EntityRoster, Token};
use crate::scene::Scene;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One alias occurrence in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub character_id: CharacterId,
    /// Byte offset of the first word of the match.
    pub start: usize,
    /// Number of words matched.
    pub words: usize,
}

/// Alias lookup keyed by first word, longest alias first.
struct AliasMatcher {
    by_first_word: HashMap<String, Vec<(Vec<String>, CharacterId)>>,
}

impl AliasMatcher {
    fn new(roster: &EntityRoster) -> Self {
        let mut by_first_word: HashMap<String, Vec<(Vec<String>, CharacterId)>> = HashMap::new();
        for (alias, id) in roster.aliases() {
            let words: Vec<String> = alias.split(' ').map(str::to_string).collect();
            if let Some(first) = words.first().filter(|w| !w.is_empty()) {
                by_first_word
                    .entry(first.clone())
                    .or_default()
                    .push((words, id.clone()));
            }
        }
        for entries in by_first_word.values_mut() {
            entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(&b.0)));
        }
        Self { by_first_word }
    }

    /// Longest alias starting at `tokens[0]`, as `(word count, character)`.
    fn longest_at(&self, tokens: &[Token<'_>]) -> Option<(usize, &CharacterId)> {
        let first = tokens.first()?;
        let entries = self.by_first_word.get(&first.normalized)?;
        entries.iter().find_map(|(words, id)| {
            let len = words.len();
            if len > tokens.len() {
                return None;
            }
            let window = &tokens[..len];
            let words_match = window.iter().zip(words).all(|(t, w)| &t.normalized == w);
            // Punctuation inside the window splits the name.
            let unbroken = window[..len - 1].iter().all(|t| !t.breaks_after);
            (words_match && unbroken).then_some((len, id))
        })
    }
}

/// Find every alias occurrence in `text`, longest match first.
pub fn find_mentions(text: &str, roster: &EntityRoster) -> Vec<Mention> {
    let matcher = AliasMatcher::new(roster);
    let tokens = tokenize(text);
    let mut mentions = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        match matcher.longest_at(&tokens[i..]) {
            Some((words, id)) => {
                mentions.push(Mention {
                    character_id: id.clone(),
                    start: tokens[i].start,
                    words,
                });
                i += words;
            }
            None => i += 1,
        }
    }

    mentions
}

/// Count mentions per character in `text`.
pub fn count_mentions(text: &str, roster: &EntityRoster) -> BTreeMap<CharacterId, u64> {
    let mut counts = BTreeMap::new();
    for mention in find_mentions(text, roster) {
        *counts.entry(mention.character_id).or_insert(0) += 1;
    }
    counts
}

/// Mention and scene-appearance increments for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkTally {
    pub mentions: BTreeMap<CharacterId, u64>,
    /// Number of the chunk's scenes each character appears in.
    pub appearances: BTreeMap<CharacterId, u64>,
}

/// Count mentions and appearances for a chunk, scene by scene.
///
/// Counting per scene keeps a name from matching across a scene break.
/// Pure function of the chunk and the roster.
pub fn tally_chunk(chunk: &SceneChunk, scenes: &[Scene], roster: &EntityRoster) -> ChunkTally {
    let mut tally = ChunkTally::default();

    for scene in chunk.scene_indices.iter().filter_map(|&i| scenes.get(i)) {
        let counts = count_mentions(&scene.text, roster);
        let present: BTreeSet<&CharacterId> = counts.keys().collect();
        for id in present {
            *tally.appearances.entry(id.clone()).or_insert(0) += 1;
        }
        for (id, count) in counts {
            *tally.mentions.entry(id).or_insert(0) += count;
        }
    }

    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::plan_chunks;
    use crate::scene::segment;

    fn jon_roster() -> (EntityRoster, CharacterId) {
        let mut roster = EntityRoster::new();
        let jon = roster.register("Jon Snow", &["Jon", "Snow"]);
        (roster, jon)
    }

    #[test]
    fn test_longest_alias_counts_once() {
        let (roster, jon) = jon_roster();
        let counts = count_mentions("Jon Snow stood.", &roster);

        assert_eq!(counts.get(&jon), Some(&1));
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn test_separate_mentions_each_count() {
        let (roster, jon) = jon_roster();
        let counts = count_mentions("Jon ran. Snow fell on Jon Snow, and JON laughed.", &roster);

        assert_eq!(counts.get(&jon), Some(&4));
    }

    #[test]
    fn test_no_match_inside_longer_words() {
        let (roster, jon) = jon_roster();
        let counts = count_mentions("Jonathan shovelled the snowdrift.", &roster);

        assert!(!counts.contains_key(&jon));
    }

    #[test]
    fn test_punctuation_splits_multi_word_alias() {
        let (roster, _) = jon_roster();
        let mentions = find_mentions("He said Jon. Snow fell.", &roster);

        assert_eq!(mentions.len(), 2);
        assert!(mentions.iter().all(|m| m.words == 1));
    }

    #[test]
    fn test_possessive_matches() {
        let (roster, jon) = jon_roster();
        let mentions = find_mentions("Jon Snow's wolf.", &roster);

        assert_eq!(mentions, vec![Mention { character_id: jon, start: 0, words: 2 }]);
    }

    #[test]
    fn test_distinct_characters_sharing_a_word() {
        let mut roster = EntityRoster::new();
        let ned = roster.register("Eddard Stark", &["Ned"]);
        let arya = roster.register("Arya Stark", &[]);
        let counts = count_mentions("Arya Stark and Eddard Stark. Ned nodded.", &roster);

        assert_eq!(counts.get(&arya), Some(&1));
        assert_eq!(counts.get(&ned), Some(&2));
    }

    #[test]
    fn test_tally_counts_appearances_per_scene() {
        let (roster, jon) = jon_roster();
        let text = "Jon ate. Jon slept.\n\nNobody came.\n\nSnow watched.";
        let scenes = segment(text, None).scenes;
        let chunks = plan_chunks(text, &scenes, 5000);

        let tally = tally_chunk(&chunks[0], &scenes, &roster);
        assert_eq!(tally.mentions.get(&jon), Some(&3));
        assert_eq!(tally.appearances.get(&jon), Some(&2));
    }

    #[test]
    fn test_names_do_not_match_across_scene_breaks() {
        let (roster, jon) = jon_roster();
        let text = "They called for Jon\n\nSnow covered the hills.";
        let scenes = segment(text, None).scenes;
        let chunks = plan_chunks(text, &scenes, 5000);

        let tally = tally_chunk(&chunks[0], &scenes, &roster);
        assert_eq!(tally.mentions.get(&jon), Some(&2));
    }
}
