//! Read buffer with bounded tail search.
//!
//! Only the last `search_depth` bytes are scanned for prompt patterns. For
//! large outputs (full BGP tables, `show tech`), re-scanning the whole buffer
//! on every chunk would dominate the cost of a read.

use bytes::{Buf, BytesMut};
use memchr::memmem;
use regex::bytes::Regex;

use super::patterns::find_prompt_at_end;

/// Buffer for accumulating output and searching its tail for patterns.
#[derive(Debug)]
pub struct ReadBuffer {
    /// The accumulated raw output.
    buffer: BytesMut,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,
}

impl ReadBuffer {
    /// Create a new buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth: search_depth.max(1),
        }
    }

    /// Append raw bytes. No filtering happens here.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Start offset of the search window, never before `floor`.
    fn window_start(&self, floor: usize) -> usize {
        self.buffer
            .len()
            .saturating_sub(self.search_depth)
            .max(floor.min(self.buffer.len()))
    }

    /// Search the tail for `pattern` matching at the end of received data.
    ///
    /// Returns the absolute `(start, end)` of the match. Bytes before
    /// `floor` (typically the echoed input) are never considered.
    pub fn search_tail(&self, pattern: &Regex, floor: usize) -> Option<(usize, usize)> {
        let start = self.window_start(floor);
        find_prompt_at_end(&self.buffer[start..], pattern).map(|(s, e)| (start + s, start + e))
    }

    /// Search the tail for `pattern` anywhere (not only at the end).
    pub fn search_tail_anywhere(&self, pattern: &Regex, floor: usize) -> Option<(usize, usize)> {
        let start = self.window_start(floor);
        pattern
            .find(&self.buffer[start..])
            .map(|m| (start + m.start(), start + m.end()))
    }

    /// Remove the last occurrence of `needle` from the tail window.
    ///
    /// Returns true when something was removed.
    pub fn remove_from_tail(&mut self, needle: &[u8], floor: usize) -> bool {
        if needle.is_empty() {
            return false;
        }
        let start = self.window_start(floor);
        let Some(pos) = memmem::rfind(&self.buffer[start..], needle) else {
            return false;
        };
        let mut rest = self.buffer.split_off(start + pos);
        rest.advance(needle.len());
        self.buffer.extend_from_slice(&rest);
        true
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the search depth setting.
    pub fn search_depth(&self) -> usize {
        self.search_depth
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
