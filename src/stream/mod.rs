//! Stream normalization for raw child output.
//!
//! Raw chunks arrive in arrival order but with no structural guarantees:
//! they may split ANSI escape sequences or UTF-8 code points at any byte
//! boundary, and interactive compilers redraw their progress line with
//! carriage returns instead of printing new lines. The [`Normalizer`]
//! absorbs all of that and produces three things per chunk:
//!
//! - classification segments for the progress engine,
//! - explicit `PROGRESS:<int>:<free text>` sub-protocol updates (consumed
//!   here, never forwarded to display),
//! - display events with carriage-return redraw semantics already applied.

use regex::Regex;
use std::sync::LazyLock;

// Also strips private sequences like "\x1b[?25l" (cursor visibility).
static ANSI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());

static EXCESS_NEWLINES_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// An explicit out-of-band progress update from the child.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolUpdate {
    pub percent: u8,
    pub message: String,
}

/// What the display sink should do with a piece of normalized text.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    /// A completed line, terminated by a newline.
    Line(String),
    /// The current state of the unterminated last line (progress-bar
    /// redraws replace it in place).
    Partial(String),
}

/// Everything one raw chunk normalized into.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizedChunk {
    /// Control-stripped segments for the progress engine, split on both
    /// newlines and carriage returns.
    pub lines: Vec<String>,
    /// Extracted sub-protocol updates.
    pub protocol: Vec<ProtocolUpdate>,
    /// Display events, in order.
    pub display: Vec<DisplayEvent>,
}

enum Terminator {
    Newline,
    Return,
    End,
}

/// Stateful chunk normalizer.
///
/// State is limited to the current partial display line and two small carry
/// buffers for escape sequences and UTF-8 code points split across chunk
/// boundaries.
#[derive(Debug, Default)]
pub struct Normalizer {
    partial: String,
    utf8_carry: Vec<u8>,
    escape_carry: String,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize one raw chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> NormalizedChunk {
        let text = self.decode(chunk);
        let text = self.strip_controls(&text);
        // CRLF pairs are ordinary line endings, not redraw requests.
        let text = text.replace("\r\n", "\n");
        let text = EXCESS_NEWLINES_REGEX.replace_all(&text, "\n\n");

        let mut out = NormalizedChunk::default();
        if text.is_empty() {
            return out;
        }

        let mut pending_partial = false;
        for (segment, terminator) in split_segments(&text) {
            if let Some(update) = parse_protocol(segment) {
                out.protocol.push(update);
                continue;
            }
            if !segment.is_empty() {
                out.lines.push(segment.to_string());
            }
            match terminator {
                Terminator::Newline => {
                    self.partial.push_str(segment);
                    out.display
                        .push(DisplayEvent::Line(std::mem::take(&mut self.partial)));
                    pending_partial = false;
                }
                Terminator::Return => {
                    // The cursor went back to column 0: whatever follows
                    // overwrites the line built up so far.
                    self.partial.clear();
                    pending_partial = true;
                }
                Terminator::End => {
                    self.partial.push_str(segment);
                    pending_partial = true;
                }
            }
        }

        if pending_partial {
            out.display.push(DisplayEvent::Partial(self.partial.clone()));
        }
        out
    }

    /// Decode bytes to text, carrying an incomplete trailing UTF-8 code
    /// point over to the next chunk.
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_carry);
        bytes.extend_from_slice(chunk);
        match std::str::from_utf8(&bytes) {
            Ok(text) => text.to_string(),
            Err(err) => {
                let valid = err.valid_up_to();
                // An incomplete code point at the end is carried; anything
                // else is genuinely invalid and replaced lossily.
                if err.error_len().is_none() && bytes.len() - valid < 4 {
                    self.utf8_carry = bytes[valid..].to_vec();
                    String::from_utf8_lossy(&bytes[..valid]).into_owned()
                } else {
                    String::from_utf8_lossy(&bytes).into_owned()
                }
            }
        }
    }

    /// Strip ANSI control sequences, carrying an unterminated trailing
    /// sequence over to the next chunk.
    fn strip_controls(&mut self, text: &str) -> String {
        let mut combined = std::mem::take(&mut self.escape_carry);
        combined.push_str(text);
        if let Some(pos) = combined.rfind('\x1b')
            && is_unterminated_escape(&combined[pos..])
        {
            self.escape_carry = combined.split_off(pos);
        }
        ANSI_REGEX.replace_all(&combined, "").into_owned()
    }
}

/// True when `tail` (starting at an ESC byte) has not yet seen its final
/// letter and may be completed by the next chunk.
fn is_unterminated_escape(tail: &str) -> bool {
    let mut chars = tail.chars();
    if chars.next() != Some('\x1b') {
        return false;
    }
    match chars.next() {
        None => true,
        Some('[') => chars.all(|c| c.is_ascii_digit() || c == ';' || c == '?'),
        Some(_) => false,
    }
}

fn split_segments(text: &str) -> Vec<(&str, Terminator)> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '\n' => {
                segments.push((&text[start..idx], Terminator::Newline));
                start = idx + 1;
            }
            '\r' => {
                segments.push((&text[start..idx], Terminator::Return));
                start = idx + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        segments.push((&text[start..], Terminator::End));
    }
    segments
}

/// Parse the explicit `PROGRESS:<int>:<free text>` protocol line.
fn parse_protocol(segment: &str) -> Option<ProtocolUpdate> {
    let rest = segment.trim().strip_prefix("PROGRESS:")?;
    let (percent, message) = match rest.split_once(':') {
        Some((p, m)) => (p, m),
        None => (rest, ""),
    };
    let percent: u8 = percent.trim().parse().ok()?;
    Some(ProtocolUpdate {
        percent: percent.min(100),
        message: message.trim().to_string(),
    })
}
