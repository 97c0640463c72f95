//! Scene segmentation.
//!
//! A chapter is split into scenes using structural cues only:
//! blank-line runs, explicit break markers (`***`, `* * *`, `---`, `~~~`),
//! and markdown-style headings. Segmentation is lossless: every byte of the
//! chapter is either inside exactly one scene or inside a separator between
//! scenes, so [`reassemble`] rebuilds the original text exactly.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// A line made only of a repeated break glyph.
    static ref SCENE_BREAK: Regex =
        Regex::new(r"^\s*(?:(?:\*\s*){3,}|(?:-\s*){3,}|(?:~\s*){3,}|(?:=\s*){3,}|(?:#\s*){3,}|§)\s*$")
            .expect("scene break regex");

    /// A markdown heading line. The heading opens the scene that follows it.
    static ref HEADING: Regex = Regex::new(r"^\s*#{1,6}\s+\S").expect("heading regex");
}

/// A contiguous span of a chapter treated as one narrative unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Chapter-local position, starting at 0.
    pub index: usize,
    /// The scene's text, exactly as it appears in the chapter.
    pub text: String,
    /// Byte offsets `(start, end)` of the scene in the chapter text.
    pub span: (usize, usize),
}

impl Scene {
    /// Length of the scene in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Why the segmenter fell back to a single scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The chapter had no non-whitespace content.
    EmptyText,
    /// No structural boundary was found, so the whole chapter is one scene.
    NoBoundary,
}

impl FallbackReason {
    pub fn describe(&self) -> &'static str {
        match self {
            FallbackReason::EmptyText => "chapter text is empty",
            FallbackReason::NoBoundary => "no scene boundary found",
        }
    }
}

/// Result of segmenting one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    pub scenes: Vec<Scene>,
    /// Set when the chapter could not be split on structure.
    pub fallback: Option<FallbackReason>,
}

impl Segmentation {
    /// The separator text around the scenes: one entry before the first
    /// scene, one between each pair, and one after the last.
    pub fn separators<'a>(&self, chapter_text: &'a str) -> Vec<&'a str> {
        let mut separators = Vec::with_capacity(self.scenes.len() + 1);
        let mut cursor = 0;
        for scene in &self.scenes {
            separators.push(chapter_text.get(cursor..scene.span.0).unwrap_or(""));
            cursor = scene.span.1;
        }
        separators.push(chapter_text.get(cursor..).unwrap_or(""));
        separators
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Break,
    Heading,
    Text,
}

fn classify(line: &str) -> LineKind {
    if line.trim().is_empty() {
        LineKind::Blank
    } else if SCENE_BREAK.is_match(line) {
        LineKind::Break
    } else if HEADING.is_match(line) {
        LineKind::Heading
    } else {
        LineKind::Text
    }
}

/// Scene being accumulated line by line.
struct OpenScene {
    start: usize,
    end: usize,
    chars: usize,
    heading_only: bool,
}

/// Split chapter text into ordered, non-overlapping scenes.
///
/// With `max_scene_chars` set, a scene that would grow past the limit is
/// closed at the previous line break and a new scene starts on the next line.
/// A single line longer than the limit is never split.
pub fn segment(text: &str, max_scene_chars: Option<usize>) -> Segmentation {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut open: Option<OpenScene> = None;
    let mut saw_boundary = false;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        let content = line.trim_end_matches(['\n', '\r']);
        let kind = classify(content);

        match kind {
            LineKind::Blank => {
                // A heading stays attached to the scene it introduces.
                if open.as_ref().is_some_and(|scene| !scene.heading_only) {
                    if let Some(scene) = open.take() {
                        spans.push((scene.start, scene.end));
                    }
                    saw_boundary = true;
                }
            }
            LineKind::Break => {
                if let Some(scene) = open.take() {
                    spans.push((scene.start, scene.end));
                }
                saw_boundary = true;
            }
            LineKind::Heading | LineKind::Text => {
                let lead = content.len() - content.trim_start().len();
                let start = line_start + lead;
                let end = line_start + content.trim_end().len();
                let line_chars = text[start..end].chars().count();

                if kind == LineKind::Heading {
                    if let Some(scene) = open.take() {
                        spans.push((scene.start, scene.end));
                        saw_boundary = true;
                    }
                }

                match open.as_mut() {
                    Some(scene) => {
                        let gap_chars = text[scene.end..start].chars().count();
                        let over_limit = max_scene_chars
                            .is_some_and(|max| scene.chars + gap_chars + line_chars > max);
                        if over_limit && !scene.heading_only {
                            spans.push((scene.start, scene.end));
                            *scene = OpenScene {
                                start,
                                end,
                                chars: line_chars,
                                heading_only: false,
                            };
                        } else {
                            scene.end = end;
                            scene.chars += gap_chars + line_chars;
                            scene.heading_only = false;
                        }
                    }
                    None => {
                        open = Some(OpenScene {
                            start,
                            end,
                            chars: line_chars,
                            heading_only: kind == LineKind::Heading,
                        });
                    }
                }
            }
        }
    }

    if let Some(scene) = open.take() {
        spans.push((scene.start, scene.end));
    }

    let fallback = if spans.is_empty() {
        spans.push((0, 0));
        Some(FallbackReason::EmptyText)
    } else if spans.len() == 1 && !saw_boundary {
        Some(FallbackReason::NoBoundary)
    } else {
        None
    };

    let scenes = spans
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| Scene {
            index,
            text: text[start..end].to_string(),
            span: (start, end),
        })
        .collect();

    Segmentation { scenes, fallback }
}

/// Rebuild chapter text from its scenes, reinserting the original separators.
pub fn reassemble(chapter_text: &str, scenes: &[Scene]) -> String {
    let mut out = String::with_capacity(chapter_text.len());
    let mut cursor = 0;
    for scene in scenes {
        out.push_str(chapter_text.get(cursor..scene.span.0).unwrap_or(""));
        out.push_str(&scene.text);
        cursor = scene.span.1;
    }
    out.push_str(chapter_text.get(cursor..).unwrap_or(""));
    out
}
