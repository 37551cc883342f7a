//! Pattern matching utilities for prompt and echo detection.

use memchr::memmem;
use regex::bytes::Regex;

/// How the channel confirms that the device echoed an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputHandling {
    /// The input must appear verbatim in the echoed stream.
    Exact,

    /// Every input byte must appear in order, gaps allowed.
    #[default]
    Fuzzy,

    /// Do not wait for an echo at all (control characters, hidden input).
    Ignore,
}

impl InputHandling {
    /// Byte offset just past the echoed `input` within `data`, if seen.
    pub fn echo_end(self, data: &[u8], input: &[u8]) -> Option<usize> {
        match self {
            InputHandling::Exact => exact_match_end(data, input),
            InputHandling::Fuzzy => fuzzy_match_end(data, input),
            InputHandling::Ignore => Some(0),
        }
    }
}

/// End offset of the first verbatim occurrence of `needle`.
pub fn exact_match_end(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    memmem::find(haystack, needle).map(|start| start + needle.len())
}

/// End offset of the shortest prefix of `haystack` containing `needle` as a subsequence.
///
/// Tolerates backspaces, carriage returns and line reflow injected between
/// the echoed characters, but not reordering.
pub fn fuzzy_match_end(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let mut wanted = needle.iter().peekable();
    for (idx, byte) in haystack.iter().enumerate() {
        match wanted.peek() {
            None => return Some(idx),
            Some(&&next) if next == *byte => {
                wanted.next();
                if wanted.peek().is_none() {
                    return Some(idx + 1);
                }
            }
            Some(_) => {}
        }
    }
    if wanted.peek().is_none() {
        Some(haystack.len())
    } else {
        None
    }
}

/// Find the last match of `pattern` that sits at the end of `data`.
///
/// Only trailing whitespace may follow the match. This gives `$` the meaning
/// "end of what has been received so far" even for `(?m)` patterns, so a
/// prompt-looking line in the middle of output is not taken as the prompt.
pub fn find_prompt_at_end(data: &[u8], pattern: &Regex) -> Option<(usize, usize)> {
    let trimmed_len = data.len() - trailing_whitespace(data);
    pattern
        .find_iter(data)
        .filter(|m| m.end() >= trimmed_len)
        .last()
        .map(|m| (m.start(), m.end()))
}

fn trailing_whitespace(data: &[u8]) -> usize {
    data.iter()
        .rev()
        .take_while(|b| b.is_ascii_whitespace())
        .count()
}

/// Compile a prompt pattern string into a regex.
///
/// Anchors to end of input if no anchor was given.
pub fn compile_prompt_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let pattern = if pattern.ends_with('$') {
        pattern.to_string()
    } else {
        format!("{}\\s*$", pattern)
    };

    Regex::new(&pattern)
}

/// OR together several prompt patterns, preserving each one's own flags.
pub fn combine_patterns<'a>(
    patterns: impl IntoIterator<Item = &'a Regex>,
) -> Result<Regex, regex::Error> {
    let combined = patterns
        .into_iter()
        .map(|p| format!("(?:{})", p.as_str()))
        .collect::<Vec<_>>()
        .join("|");

    if combined.is_empty() {
        Regex::new(r"[$#>]\s*$")
    } else {
        Regex::new(&combined)
    }
}
