//! Paragraph-boundary text segmentation.
//!
//! Splits document text into [`TextSegment`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! so each segment stays semantically coherent.
//!
//! Also derives the deterministic identifiers written alongside segments:
//! [`source_id_for`] folds a path (or any identifying string) into a UUID,
//! and [`segment_id`] does the same for `(source_id, index)`. Re-ingesting
//! the same file therefore overwrites its segments instead of duplicating them.
//!
//! # Example
//!
//! ```rust
//! use vectors_connector_core::chunk::split_text;
//!
//! let segments = split_text("Hello world.\n\nSecond paragraph.", 700);
//! assert_eq!(segments.len(), 1);
//! assert_eq!(segments[0].index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub index: usize,
    pub text: String,
}

/// Split text into segments on paragraph boundaries, respecting `max_tokens`.
///
/// - Indices are contiguous from 0.
/// - Oversized paragraphs are hard-split at the last newline or space
///   before the limit, falling back to a char boundary.
/// - Empty or whitespace-only text yields no segments.
pub fn split_text(text: &str, max_tokens: usize) -> Vec<TextSegment> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            hard_split(para, max_chars, &mut pieces);
            continue;
        }
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextSegment { index, text })
        .collect()
}

fn hard_split(mut remaining: &str, max_chars: usize, out: &mut Vec<String>) {
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining.trim().to_string());
            return;
        }
        let limit = snap_to_char_boundary(remaining, max_chars);
        let cut = remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .map(|pos| pos + 1)
            .filter(|&pos| pos > 0)
            .unwrap_or(limit);
        // A single char wider than max_chars still has to make progress.
        let cut = if cut == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            cut
        };
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Deterministic UUID for a source identified by `identity` (usually a path).
pub fn source_id_for(identity: &str) -> String {
    uuid_from_digest(identity.as_bytes())
}

/// Deterministic UUID for segment `index` of `source_id`.
pub fn segment_id(source_id: &str, index: usize) -> String {
    uuid_from_digest(format!("{}:{}", source_id, index).as_bytes())
}

/// Random UUID for sources without a stable identity (raw text).
pub fn random_source_id() -> String {
    Uuid::new_v4().to_string()
}

fn uuid_from_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&digest[..16]);
    // Stamp version 4 / RFC 4122 variant bits so strict backends accept it.
    raw[6] = (raw[6] & 0x0f) | 0x40;
    raw[8] = (raw[8] & 0x3f) | 0x80;
    Uuid::from_bytes(raw).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_segment() {
        let segments = split_text("Hello, world!", 700);
        assert_eq!(
            segments,
            vec![TextSegment {
                index: 0,
                text: "Hello, world!".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 700).is_empty());
        assert!(split_text(" \n\n  ", 700).is_empty());
    }

    #[test]
    fn test_paragraphs_exceeding_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        // 28 chars fits one paragraph but never two.
        let segments = split_text(text, 7);
        assert_eq!(segments.len(), 3);
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.index, i);
        }
    }

    #[test]
    fn test_paragraphs_wider_than_limit_are_hard_split() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let segments = split_text(text, 5);
        assert_eq!(segments.len(), 6);
        assert!(segments.iter().all(|s| s.text.len() <= 20));
        assert_eq!(segments[0].text, "This is paragraph");
        assert_eq!(segments[1].text, "one.");
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let text = "word ".repeat(40);
        let segments = split_text(&text, 5);
        assert!(segments.len() > 1);
        assert!(segments.iter().all(|s| s.text.len() <= 20));
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let segments = split_text(text, 3);
        assert!(!segments.is_empty());
        assert!(segments.iter().all(|s| !s.text.is_empty()));
    }

    #[test]
    fn test_ids_are_deterministic_uuids() {
        let a = source_id_for("/data/a.txt");
        assert_eq!(a, source_id_for("/data/a.txt"));
        assert_ne!(a, source_id_for("/data/b.txt"));
        assert!(Uuid::parse_str(&a).is_ok());

        let s0 = segment_id(&a, 0);
        assert_eq!(s0, segment_id(&a, 0));
        assert_ne!(s0, segment_id(&a, 1));
        assert_eq!(Uuid::parse_str(&s0).unwrap().get_version_num(), 4);
    }
}
