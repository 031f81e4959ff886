//! Progressive decoder for `data: <json>` event-stream records
//!
//! The chat endpoint answers with a `text/event-stream` body. Network chunks
//! arrive at arbitrary boundaries, so the decoder buffers the unconsumed
//! remainder between feeds and only releases fully-formed record bodies.

const MARKER: &str = "data: ";

/// Splits successive opaque text chunks into complete event records.
///
/// A record starts at a `data: ` line and continues through subsequent
/// non-marker lines (the body may be JSON with embedded newlines) until the
/// next marker line or the end of the buffer. A tail still being collected is
/// released early only if it already parses as complete JSON; otherwise it is
/// carried over, marker re-prepended, into the next feed.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    remainder: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next chunk and return every record completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let buffer = std::mem::take(&mut self.remainder) + chunk;

        let mut records = Vec::new();
        let mut remainder = String::new();
        let mut collecting = false;
        let mut current = String::new();

        for line in buffer.split('\n') {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(body) = line.strip_prefix(MARKER) {
                if collecting && !current.is_empty() {
                    records.push(std::mem::take(&mut current));
                }
                collecting = true;
                current = body.to_string();
            } else if collecting {
                // Continuation of a multi-line record body.
                current.push('\n');
                current.push_str(line);
            } else {
                // Not ours; keep it around verbatim.
                if !remainder.is_empty() {
                    remainder.push('\n');
                }
                remainder.push_str(line);
            }
        }

        if collecting {
            // The tail may or may not be a finished record. If it already
            // parses as JSON (or is the literal end sentinel) it is complete;
            // otherwise hold it for the next chunk with the marker restored.
            if current.trim() == "[DONE]"
                || serde_json::from_str::<serde_json::Value>(&current).is_ok()
            {
                records.push(current);
            } else {
                if !remainder.is_empty() {
                    remainder.push('\n');
                }
                remainder.push_str(MARKER);
                remainder.push_str(&current);
            }
        }

        self.remainder = remainder;
        records
    }

    /// Whatever is still buffered when the stream ends. Dropped by callers;
    /// exposed so they can log it.
    pub fn into_remainder(self) -> String {
        self.remainder
    }
}
