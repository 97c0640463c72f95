//! Tokenizing and proper-noun candidate detection.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\S+").expect("word regex");

    /// Capitalized words that start sentences but never name a character.
    static ref STOPWORDS: HashSet<&'static str> = [
        // pronouns and determiners
        "i", "me", "my", "mine", "you", "your", "yours", "he", "him", "his", "she", "her",
        "hers", "it", "its", "we", "us", "our", "ours", "they", "them", "their", "theirs",
        "the", "a", "an", "this", "that", "these", "those", "there", "here",
        // connectives and common sentence openers
        "and", "but", "or", "nor", "so", "yet", "then", "when", "while", "after", "before",
        "if", "as", "at", "in", "on", "of", "for", "with", "from", "to", "by", "into",
        "yes", "no", "not", "oh", "ah", "well", "now", "what", "where", "who", "whom",
        "why", "how", "once", "still", "though", "although", "because", "perhaps", "maybe",
        "all", "every", "each", "some", "one", "none", "nothing", "something", "everyone",
        "someone", "nobody", "later", "soon", "meanwhile", "suddenly", "finally", "again",
        "chapter", "part", "book", "scene", "prologue", "epilogue",
        // calendar words
        "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
        "january", "february", "march", "april", "may", "june", "july", "august",
        "september", "october", "november", "december",
    ]
    .into_iter()
    .collect();

    /// Honorifics. A trailing period on these does not end a name.
    static ref TITLES: HashSet<&'static str> = [
        "mr", "mrs", "ms", "miss", "dr", "st", "sir", "dame", "lady", "lord", "king",
        "queen", "prince", "princess", "captain", "maester", "ser", "master", "mistress",
        "professor", "uncle", "aunt",
    ]
    .into_iter()
    .collect();
}

/// A word of text with its normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// The word with surrounding punctuation and any possessive removed.
    pub core: &'a str,
    /// Lowercased `core`.
    pub normalized: String,
    /// Byte offset of `core` in the source text.
    pub start: usize,
    /// Whether the word starts with an uppercase letter.
    pub capitalized: bool,
    /// Whether punctuation after this word ends a multi-word name.
    pub breaks_after: bool,
}

/// Strip a trailing possessive `'s`.
fn strip_possessive(word: &str) -> &str {
    for suffix in ["'s", "’s", "'S", "’S"] {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }
    word
}

/// Whether the whitespace between two words contains a blank line.
fn is_paragraph_gap(gap: &str) -> bool {
    gap.chars().filter(|&c| c == '\n').count() >= 2
}

/// Split text into word tokens.
///
/// Punctuation-only words are dropped but still break multi-word names, as
/// does a blank line between two words.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens: Vec<Token<'_>> = Vec::new();
    let mut previous_end = 0;

    for m in WORD.find_iter(text) {
        if is_paragraph_gap(&text[previous_end..m.start()]) {
            if let Some(previous) = tokens.last_mut() {
                previous.breaks_after = true;
            }
        }
        previous_end = m.end();

        let raw = m.as_str();
        let trimmed_start = raw.trim_start_matches(|c: char| !c.is_alphanumeric());
        let lead = raw.len() - trimmed_start.len();
        let trimmed = trimmed_start.trim_end_matches(|c: char| !c.is_alphanumeric());
        let core = strip_possessive(trimmed)
            .trim_end_matches(|c: char| !c.is_alphanumeric());

        if core.is_empty() {
            if let Some(previous) = tokens.last_mut() {
                previous.breaks_after = true;
            }
            continue;
        }

        if lead > 0 {
            if let Some(previous) = tokens.last_mut() {
                previous.breaks_after = true;
            }
        }

        let normalized = core.to_lowercase();
        let trailing = &trimmed_start[trimmed.len()..];
        let breaks_after = !trailing.is_empty() && !TITLES.contains(normalized.as_str());

        tokens.push(Token {
            core,
            capitalized: core.chars().next().is_some_and(char::is_uppercase),
            normalized,
            start: m.start() + lead,
            breaks_after,
        });
    }

    tokens
}

/// Normalize a name for alias comparison: case-folded words with
/// punctuation and possessives removed, joined by single spaces.
pub fn normalize_name(name: &str) -> String {
    tokenize(name)
        .into_iter()
        .map(|t| t.normalized)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a normalized name into its words.
pub fn name_words(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}

/// Whether a word is an uppercase roman numeral, as in `CHAPTER IV`.
fn is_roman_numeral(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| matches!(c, 'I' | 'V' | 'X' | 'L' | 'C' | 'D' | 'M'))
}

/// Whether a normalized word is an honorific.
pub fn is_title(word: &str) -> bool {
    TITLES.contains(word)
}

/// A proper-noun-like span detected in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Surface form, e.g. `Jon Snow`.
    pub surface: String,
    /// Normalized form, e.g. `jon snow`.
    pub normalized: String,
    /// Byte offset of the first word in the source text.
    pub start: usize,
}

/// Find runs of capitalized words that look like names.
///
/// Stopwords end a run and are never part of a candidate. Candidates that are
/// only honorifics or numerals, or shorter than `min_chars`, are discarded.
pub fn detect_candidates(text: &str, min_chars: usize, extra_stopwords: &[String]) -> Vec<Candidate> {
    let tokens = tokenize(text);
    let is_stopword = |word: &str| {
        STOPWORDS.contains(word) || extra_stopwords.iter().any(|s| s == word)
    };

    let mut candidates = Vec::new();
    let mut run: Vec<&Token<'_>> = Vec::new();

    let mut flush = |run: &mut Vec<&Token<'_>>| {
        if run.is_empty() {
            return;
        }
        let normalized = run
            .iter()
            .map(|t| t.normalized.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let all_titles = run.iter().all(|t| is_title(&t.normalized));
        let all_numerals = run.iter().all(|t| is_roman_numeral(t.core));
        if !all_titles && !all_numerals && normalized.chars().count() >= min_chars {
            candidates.push(Candidate {
                surface: run.iter().map(|t| t.core).collect::<Vec<_>>().join(" "),
                normalized,
                start: run[0].start,
            });
        }
        run.clear();
    };

    for token in &tokens {
        if token.capitalized && !is_stopword(&token.normalized) {
            run.push(token);
            if token.breaks_after {
                flush(&mut run);
            }
        } else {
            flush(&mut run);
        }
    }
    flush(&mut run);

    candidates
}
