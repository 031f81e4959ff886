//! Interact-block extraction from streamed token text
//!
//! Bot answers may embed `<interact>...</interact>` spans carrying
//! clarification questions in a line-oriented mini-grammar:
//!
//! ```text
//! <interact>questions:
//! - text: Which airport?
//!   options:
//!   - Delhi
//!   - Mumbai
//! </interact>
//! ```
//!
//! The scanner is an explicit two-state machine over incoming fragments.
//! Tags can be split at any fragment boundary, including mid-tag; a trailing
//! fragment that is a prefix of the open tag is held back rather than leaked
//! as prose.

use crate::conversation::Clarification;

const OPEN_TAG: &str = "<interact>";
const CLOSE_TAG: &str = "</interact>";

/// What a single `feed` produced: the text safe to treat as prose, and any
/// clarifications parsed out of blocks that closed during this feed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub prose: String,
    pub clarifications: Vec<Clarification>,
}

#[derive(Debug, Default)]
pub struct InteractScanner {
    collecting: bool,
    /// Content between the tags of the block currently being collected.
    block: String,
    /// Trailing text that may turn out to be the start of an open tag.
    pending: String,
}

impl InteractScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Route the next token fragment, separating prose from interact content.
    pub fn feed(&mut self, fragment: &str) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let mut input = std::mem::take(&mut self.pending);
        input.push_str(fragment);

        loop {
            if self.collecting {
                self.block.push_str(&input);
                match self.block.find(CLOSE_TAG) {
                    Some(end) => {
                        let inner = self.block[..end].to_string();
                        input = self.block[end + CLOSE_TAG.len()..].to_string();
                        self.block.clear();
                        self.collecting = false;
                        outcome.clarifications.extend(parse_clarifications(&inner));
                    }
                    None => {
                        // Close tag not seen yet; everything stays buffered.
                        input = String::new();
                        break;
                    }
                }
            } else {
                match input.find(OPEN_TAG) {
                    Some(start) => {
                        outcome.prose.push_str(&input[..start]);
                        input = input[start + OPEN_TAG.len()..].to_string();
                        self.collecting = true;
                    }
                    None => {
                        let keep = partial_tag_suffix(&input);
                        let split = input.len() - keep;
                        outcome.prose.push_str(&input[..split]);
                        self.pending = input[split..].to_string();
                        break;
                    }
                }
            }
        }

        outcome
    }

    /// Flush at end of stream. A held-back tag prefix turns out to be plain
    /// prose; an unclosed block is discarded.
    pub fn finish(&mut self) -> String {
        self.collecting = false;
        self.block.clear();
        std::mem::take(&mut self.pending)
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of the
/// open tag, i.e. might complete into `<interact>` on the next fragment.
fn partial_tag_suffix(text: &str) -> usize {
    for len in (1..OPEN_TAG.len()).rev() {
        if text.ends_with(&OPEN_TAG[..len]) {
            return len;
        }
    }
    0
}

/// Parse the content of an interact span into clarification records.
///
/// Blocks are anchored at `- text:` (or a `questions:` header); the question
/// runs until an `options:` marker; options are the `-`-prefixed lines that
/// follow it. Blocks with an empty question or no options are discarded.
pub fn parse_clarifications(content: &str) -> Vec<Clarification> {
    let mut out = Vec::new();
    let mut question: Option<String> = None;
    let mut options: Vec<String> = Vec::new();
    let mut in_options = false;

    let mut flush = |question: &mut Option<String>, options: &mut Vec<String>| {
        if let Some(q) = question.take() {
            if !q.is_empty() && !options.is_empty() {
                out.push(Clarification {
                    question: q,
                    options: std::mem::take(options),
                });
            }
        }
        options.clear();
    };

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("- text:") {
            flush(&mut question, &mut options);
            question = Some(rest.trim().to_string());
            in_options = false;
        } else if let Some(rest) = line.strip_prefix("questions:") {
            flush(&mut question, &mut options);
            in_options = false;
            let rest = rest.trim();
            question = match rest.strip_prefix("- text:") {
                Some(q) => Some(q.trim().to_string()),
                None if !rest.is_empty() => Some(rest.to_string()),
                None => None,
            };
        } else if line.starts_with("options:") {
            in_options = true;
        } else if in_options {
            if let Some(option) = line.strip_prefix('-') {
                let option = option.trim();
                if !option.is_empty() {
                    options.push(option.to_string());
                }
            }
        } else if let Some(q) = question.as_mut() {
            // Question text spilling onto following lines.
            if !q.is_empty() {
                q.push(' ');
            }
            q.push_str(line);
        }
    }

    flush(&mut question, &mut options);
    out
}

/// Idempotent cleanup projecting the raw accumulator into display text.
///
/// Removes complete interact spans, an unclosed trailing span, a trailing
/// partial open tag, and stray mini-grammar fragments that arrived outside
/// tags (malformed upstream output); then drops blank lines and trims.
pub fn clean_response(raw: &str) -> String {
    let stripped = strip_interact_spans(raw);
    let stripped = strip_trailing_partial_tag(&stripped);

    let mut lines = Vec::new();
    let mut dropping_options = false;
    for raw_line in stripped.lines() {
        let line = raw_line.trim();
        if line.starts_with("questions:") || line.starts_with("- text:") {
            dropping_options = false;
            continue;
        }
        if line.starts_with("options:") {
            dropping_options = true;
            continue;
        }
        if dropping_options && line.starts_with('-') {
            continue;
        }
        dropping_options = false;
        if line.is_empty() {
            continue;
        }
        lines.push(raw_line.trim_end());
    }

    lines.join("\n").trim().to_string()
}

fn strip_interact_spans(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find(OPEN_TAG) {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after = &rest[start + OPEN_TAG.len()..];
                match after.find(CLOSE_TAG) {
                    Some(end) => rest = &after[end + CLOSE_TAG.len()..],
                    // Unclosed span: everything from the open tag is still
                    // interact content, not prose.
                    None => break,
                }
            }
        }
    }
    out
}

fn strip_trailing_partial_tag(text: &str) -> &str {
    let keep = partial_tag_suffix(text);
    &text[..text.len() - keep]
}
