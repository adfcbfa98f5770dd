//! Accumulated shell output for a single exchange.

use memchr::memmem;
use regex::bytes::Regex;

/// Bytes from the end that a prompt can span. Prompt matching never looks
/// further back, so a full running-config costs the same to test as a
/// one-line answer.
const PROMPT_WINDOW: usize = 512;

/// Output received since the last command was sent, with terminal escape
/// sequences removed.
#[derive(Debug)]
pub struct PatternBuffer {
    data: Vec<u8>,
    window: usize,
}

impl PatternBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            data: Vec::with_capacity(4096),
            window,
        }
    }

    /// Append a chunk as read from the channel.
    pub fn push(&mut self, chunk: &[u8]) {
        self.data.extend(strip_ansi_escapes::strip(chunk));
    }

    /// The prompt that ends the output, if any.
    ///
    /// Prompt-shaped lines earlier in the transcript (a `hostname#` inside a
    /// config dump, say) do not count; only whitespace may follow the match.
    pub fn trailing_prompt(&self, prompt: &Regex) -> Option<String> {
        let window = &self.data[self.data.len().saturating_sub(self.window)..];
        let last = prompt.find_iter(window).last()?;
        window[last.end()..]
            .iter()
            .all(u8::is_ascii_whitespace)
            .then(|| String::from_utf8_lossy(last.as_bytes()).trim().to_string())
    }

    /// Whether a dialog marker such as `[confirm]` has been printed.
    pub fn contains(&self, marker: &str) -> bool {
        memmem::find(&self.data, marker.as_bytes()).is_some()
    }

    /// Hand the output over as text and start afresh.
    pub fn take_text(&mut self) -> String {
        let data = std::mem::take(&mut self.data);
        match String::from_utf8(data) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(PROMPT_WINDOW)
    }
}
