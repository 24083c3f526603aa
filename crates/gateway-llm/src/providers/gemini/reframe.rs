//! Brace-depth reframing of Gemini's streamed JSON array.
//!
//! Without `alt=sse`, `streamGenerateContent` answers with one JSON array whose
//! elements arrive over a chunked body:
//! ```text
//! [{"candidates":[{"content":{"parts":[{"text":"Hel
//! lo"}]}}]}
//! ,{"candidates":[...],"usageMetadata":{"totalTokenCount":12}}]
//! ```
//! Chunk boundaries have nothing to do with object boundaries, so each chunk
//! is scanned byte by byte and top-level objects are cut out when the brace
//! depth returns to zero. `{` and `}` are ASCII and never appear inside a
//! multi-byte UTF-8 sequence, so a chunk that splits a character is harmless.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parse failures tolerated before the stream is flagged as protocol drift.
const PROTOCOL_DRIFT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingMode {
    /// Counts every brace. `{`/`}` inside string literals break framing.
    #[default]
    BraceDepth,
    /// Ignores braces inside quoted strings, honoring `\"` escapes.
    StringAware,
}

/// Output of one [`StreamReframer::push`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// A non-empty text delta from `candidates[0].content.parts[0].text`.
    Text(String),
    /// The upstream reported an error object inside the body.
    UpstreamError(String),
}

/// Totals for a finished stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSummary {
    pub total_tokens: u64,
    pub objects: u64,
    pub parse_failures: u32,
    /// An object was still open when the stream ended.
    pub truncated: bool,
}

/// Incremental state for one streamed response.
#[derive(Debug, Default)]
pub struct StreamReframer {
    mode: FramingMode,
    buffer: Vec<u8>,
    candidate: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    total_tokens: u64,
    objects: u64,
    parse_failures: u32,
}

impl StreamReframer {
    pub fn new(mode: FramingMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    /// Highest `usageMetadata.totalTokenCount` seen so far.
    ///
    /// Gemini reports running totals on every object, so the latest (largest)
    /// value is the usage of the whole response.
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn parse_failures(&self) -> u32 {
        self.parse_failures
    }

    /// Feed one body chunk; returns the fragments completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Fragment> {
        let mut fragments = Vec::new();
        self.buffer.extend_from_slice(chunk);

        let buffer = std::mem::take(&mut self.buffer);
        for &byte in &buffer {
            if let Some(object) = self.scan(byte) {
                self.interpret(&object, &mut fragments);
            }
        }

        // Everything is consumed; keep the allocation for the next chunk.
        self.buffer = buffer;
        self.buffer.clear();

        fragments
    }

    /// Close the frame. A partially received object is dropped.
    pub fn finish(&mut self) -> FrameSummary {
        let truncated = self.depth > 0;
        if truncated {
            log::warn!(
                "Upstream stream ended inside an object ({} bytes discarded)",
                self.candidate.len()
            );
        }
        self.candidate.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;

        if self.parse_failures > 0 {
            log::warn!(
                "Upstream stream finished with {} unparseable fragment(s) out of {}",
                self.parse_failures,
                self.objects + u64::from(self.parse_failures)
            );
        }

        FrameSummary {
            total_tokens: self.total_tokens,
            objects: self.objects,
            parse_failures: self.parse_failures,
            truncated,
        }
    }

    /// Advance the scanner by one byte; returns a complete top-level object.
    fn scan(&mut self, byte: u8) -> Option<Vec<u8>> {
        if self.depth == 0 {
            // Array brackets, commas, whitespace and stray `}` are dropped.
            if byte == b'{' {
                self.candidate.clear();
                self.candidate.push(byte);
                self.depth = 1;
            }
            return None;
        }

        self.candidate.push(byte);

        if self.mode == FramingMode::StringAware {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                return None;
            }
            if byte == b'"' {
                self.in_string = true;
                return None;
            }
        }

        match byte {
            b'{' => self.depth += 1,
            b'}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    return Some(std::mem::take(&mut self.candidate));
                }
            }
            _ => {}
        }
        None
    }

    fn interpret(&mut self, raw: &[u8], fragments: &mut Vec<Fragment>) {
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(e) => {
                self.parse_failures += 1;
                log::warn!(
                    "Discarding unparseable upstream fragment ({} bytes): {}",
                    raw.len(),
                    e
                );
                if self.parse_failures == PROTOCOL_DRIFT_THRESHOLD {
                    log::error!(
                        "{} upstream fragments failed to parse in one stream; the upstream format may have drifted",
                        self.parse_failures
                    );
                }
                return;
            }
        };
        self.objects += 1;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown upstream error");
            fragments.push(Fragment::UpstreamError(message.to_string()));
            return;
        }

        if let Some(text) = value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
        {
            if !text.is_empty() {
                fragments.push(Fragment::Text(text.to_string()));
            }
        }

        if let Some(total) = value
            .pointer("/usageMetadata/totalTokenCount")
            .and_then(Value::as_u64)
        {
            self.total_tokens = self.total_tokens.max(total);
        }
    }
}
