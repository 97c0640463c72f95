//! Scene chunking.
//!
//! Consecutive whole scenes are grouped greedily into chunks whose combined
//! scene length stays within a character budget. Scenes are never split or
//! truncated: a scene longer than the budget becomes a chunk on its own.

use crate::scene::Scene;
use serde::{Deserialize, Serialize};

/// Default chunk budget in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 5000;

/// A group of consecutive scenes submitted together for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneChunk {
    /// Position of this chunk within its chapter.
    pub index: usize,
    /// Indices of the member scenes, in order.
    pub scene_indices: Vec<usize>,
    /// Chapter text from the first member scene to the last, including the
    /// original separators between them.
    pub text: String,
    /// Sum of the member scenes' lengths in characters.
    pub char_count: usize,
}

impl SceneChunk {
    /// Whether this chunk is a single scene that alone exceeds `max_chars`.
    pub fn is_oversized(&self, max_chars: usize) -> bool {
        self.char_count > max_chars && self.scene_indices.len() == 1
    }

    pub fn first_scene(&self) -> Option<usize> {
        self.scene_indices.first().copied()
    }
}

/// Lazy, restartable sequence of chunks over a chapter's scenes.
///
/// The sequence is a pure function of the scenes, the budget, and the
/// starting position, so re-deriving from the same inputs always yields the
/// same chunks.
#[derive(Debug, Clone)]
pub struct SceneChunker<'a> {
    chapter_text: &'a str,
    scenes: &'a [Scene],
    max_chars: usize,
    next_scene: usize,
    next_chunk: usize,
}

impl<'a> SceneChunker<'a> {
    /// Create a chunker over `scenes`, which must come from `chapter_text`.
    pub fn new(chapter_text: &'a str, scenes: &'a [Scene], max_chars: usize) -> Self {
        Self {
            chapter_text,
            scenes,
            max_chars,
            next_scene: 0,
            next_chunk: 0,
        }
    }

    /// Restart the sequence at a given scene, numbering chunks from `chunk_index`.
    pub fn starting_at(mut self, scene_index: usize, chunk_index: usize) -> Self {
        self.next_scene = scene_index;
        self.next_chunk = chunk_index;
        self
    }

    /// The chunk budget.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// The chapter slice covering `members`, or the member texts back to back
    /// if the scenes did not come from this chapter text.
    fn chunk_text(&self, members: &[Scene]) -> String {
        let from_chapter = members
            .iter()
            .all(|s| self.chapter_text.get(s.span.0..s.span.1) == Some(s.text.as_str()));

        match (members.first(), members.last()) {
            (Some(first), Some(last)) if from_chapter => {
                self.chapter_text[first.span.0..last.span.1].to_string()
            }
            _ => members.iter().map(|s| s.text.as_str()).collect(),
        }
    }
}

impl Iterator for SceneChunker<'_> {
    type Item = SceneChunk;

    fn next(&mut self) -> Option<SceneChunk> {
        let start = self.next_scene;
        let first = self.scenes.get(start)?;

        let mut end = start + 1;
        let mut total = first.char_len();
        while let Some(scene) = self.scenes.get(end) {
            let len = scene.char_len();
            if total + len > self.max_chars {
                break;
            }
            total += len;
            end += 1;
        }

        let members = &self.scenes[start..end];
        let chunk = SceneChunk {
            index: self.next_chunk,
            scene_indices: members.iter().map(|s| s.index).collect(),
            text: self.chunk_text(members),
            char_count: total,
        };

        self.next_scene = end;
        self.next_chunk += 1;
        Some(chunk)
    }
}

/// Chunk every scene of a chapter.
pub fn plan_chunks(chapter_text: &str, scenes: &[Scene], max_chars: usize) -> Vec<SceneChunk> {
    SceneChunker::new(chapter_text, scenes, max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::segment;

    /// Build a chapter whose scenes have the given lengths, separated by blank lines.
    fn chapter_with_scene_lengths(lengths: &[usize]) -> (String, Vec<Scene>) {
        let text = lengths
            .iter()
            .map(|&n| "x".repeat(n))
            .collect::<Vec<_>>()
            .join("\n\n");
        let scenes = segment(&text, None).scenes;
        (text, scenes)
    }

    #[test]
    fn test_greedy_chunking_example() {
        let (text, scenes) = chapter_with_scene_lengths(&[2000, 2500, 3000, 1000]);
        let chunks = plan_chunks(&text, &scenes, 5000);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].scene_indices, vec![0, 1]);
        assert_eq!(chunks[0].char_count, 4500);
        assert_eq!(chunks[1].scene_indices, vec![2, 3]);
        assert_eq!(chunks[1].char_count, 4000);
        assert!(chunks.iter().all(|c| c.char_count <= 5000));
    }

    #[test]
    fn test_oversized_scene_is_its_own_chunk() {
        let (text, scenes) = chapter_with_scene_lengths(&[100, 7000, 200, 300]);
        let chunks = plan_chunks(&text, &scenes, 5000);

        let groups: Vec<_> = chunks.iter().map(|c| c.scene_indices.clone()).collect();
        assert_eq!(groups, vec![vec![0], vec![1], vec![2, 3]]);
        assert!(chunks[1].is_oversized(5000));
        assert_eq!(chunks[1].char_count, 7000);
        assert!(!chunks[0].is_oversized(5000));
    }

    #[test]
    fn test_every_scene_in_exactly_one_chunk() {
        let lengths = [10, 40, 35, 5, 60, 1, 1, 90, 20];
        let (text, scenes) = chapter_with_scene_lengths(&lengths);
        let chunks = plan_chunks(&text, &scenes, 50);

        let flattened: Vec<usize> = chunks
            .iter()
            .flat_map(|c| c.scene_indices.iter().copied())
            .collect();
        assert_eq!(flattened, (0..lengths.len()).collect::<Vec<_>>());

        let total: usize = chunks.iter().map(|c| c.char_count).sum();
        assert_eq!(total, lengths.iter().sum::<usize>());

        for chunk in &chunks {
            assert!(chunk.char_count <= 50 || chunk.is_oversized(50));
        }
    }

    #[test]
    fn test_chunk_text_keeps_separators() {
        let text = "Jon left.\n\n***\n\nArya stayed.";
        let scenes = segment(text, None).scenes;
        let chunks = plan_chunks(text, &scenes, 5000);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].char_count, "Jon left.".len() + "Arya stayed.".len());
    }

    #[test]
    fn test_foreign_scenes_use_their_own_text() {
        let scenes = segment("Jon left.\n\nArya stayed.", None).scenes;
        let chunks = plan_chunks("unrelated chapter text", &scenes, 5000);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Jon left.Arya stayed.");
        assert_eq!(chunks[0].text.chars().count(), chunks[0].char_count);
    }

    #[test]
    fn test_restart_yields_same_sequence() {
        let (text, scenes) = chapter_with_scene_lengths(&[30, 30, 30, 30, 30]);
        let full = plan_chunks(&text, &scenes, 70);

        let resumed: Vec<_> = SceneChunker::new(&text, &scenes, 70)
            .starting_at(full[1].scene_indices[0], 1)
            .collect();
        assert_eq!(resumed, full[1..].to_vec());

        let again = plan_chunks(&text, &scenes, 70);
        assert_eq!(again, full);
    }

    #[test]
    fn test_chunk_indices_are_sequential() {
        let (text, scenes) = chapter_with_scene_lengths(&[3, 3, 3, 3]);
        let chunks = plan_chunks(&text, &scenes, 3);

        let indices: Vec<_> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }
}
