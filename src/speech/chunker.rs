//! Text preparation for speech playback
//!
//! Display text is markdown; the synthesizer wants plain sentences. The
//! markdown is walked with pulldown-cmark (code blocks dropped, inline
//! markup unwrapped, HTML tags discarded) and the result is cut into
//! bounded-size utterances that prefer sentence boundaries.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// How far back (and forward) of the hard cut to look for a sentence end.
const LOOKBACK: usize = 30;

/// Reduce markdown to plain, single-line speakable text.
pub fn speech_text(markdown: &str) -> String {
    let mut out = String::new();
    let mut in_code_block = false;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Text(text) if !in_code_block => out.push_str(&text),
            Event::Code(code) => out.push_str(&code),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::Html(_) | Event::InlineHtml(_) => out.push(' '),
            Event::End(TagEnd::Paragraph | TagEnd::Item | TagEnd::Heading(_)) => out.push(' '),
            _ => {}
        }
    }

    normalize_whitespace(&out)
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut text into chunks of roughly `chunk_size` characters.
///
/// A cut that would land mid-text is moved to the first sentence-ending
/// punctuation or line break found from `LOOKBACK` characters before the
/// hard boundary, as long as it lies within `LOOKBACK` past it; otherwise
/// the hard boundary stands. Bounds per-utterance latency without cutting
/// mid-sentence whenever a boundary is near.
pub fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = floor_char_boundary(text, (start + chunk_size).min(text.len()));
        if end < text.len() {
            if let Some(cut) = sentence_cut(text, end) {
                if cut > start {
                    end = cut;
                }
            }
        }
        if end <= start {
            end = ceil_char_boundary(text, start + 1);
        }

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }
        start = end;
    }

    chunks
}

/// First sentence boundary at or after `target - LOOKBACK`, accepted only
/// if it falls before `target + LOOKBACK`. Returns the cut position just
/// past the boundary character.
fn sentence_cut(text: &str, target: usize) -> Option<usize> {
    let from = floor_char_boundary(text, target.saturating_sub(LOOKBACK));
    text[from..]
        .find(['.', '?', '!', '\n'])
        .map(|offset| from + offset)
        .filter(|&pos| pos < target + LOOKBACK)
        .map(|pos| pos + 1)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index.min(text.len())
}
