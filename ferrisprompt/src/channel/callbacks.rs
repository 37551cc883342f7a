//! Callbacks for [`PtyChannel::read_with_callbacks`](super::PtyChannel::read_with_callbacks).
//!
//! A callback pairs a match predicate with an action. Both are tagged
//! variants; the `Custom` arms are the escape hatch for anything the
//! built-in variants do not cover.

use std::fmt;
use std::time::Duration;

use regex::Regex;

use super::PtyChannel;
use crate::error::Result;

/// Predicate evaluated against the output accumulated so far.
pub enum CallbackMatch {
    /// Output contains this substring.
    Contains(String),
    /// Output matches this regex.
    Pattern(Regex),
    /// Arbitrary predicate.
    Custom(Box<dyn Fn(&str) -> bool + Send>),
}

impl CallbackMatch {
    /// Evaluate against `output`.
    pub fn is_match(&self, output: &str) -> bool {
        match self {
            CallbackMatch::Contains(needle) => output.contains(needle.as_str()),
            CallbackMatch::Pattern(re) => re.is_match(output),
            CallbackMatch::Custom(f) => f(output),
        }
    }
}

/// What to do when a callback fires.
pub enum CallbackAction {
    /// Nothing; useful for pure terminators.
    None,
    /// Write this input followed by the return character.
    SendInput(String),
    /// Write these raw bytes as-is.
    Write(Vec<u8>),
    /// Run arbitrary code against the channel and the output seen so far.
    Custom(Box<dyn FnMut(&mut PtyChannel, &str) -> Result<()> + Send>),
}

/// One entry in a read-with-callbacks loop.
pub struct ReadCallback {
    /// Name, for logging.
    pub name: String,

    /// When this callback applies.
    pub matcher: CallbackMatch,

    /// What it does.
    pub action: CallbackAction,

    /// Fire at most once.
    pub once: bool,

    /// End the loop after this callback runs.
    pub completes: bool,

    /// Forget accumulated output after this callback runs, so the text
    /// that triggered it cannot trigger it again. On by default.
    pub reset_output_on_match: bool,

    /// Pause before the next read.
    pub next_read_delay: Option<Duration>,

    /// Deadline for the next read, counted from when this callback ran.
    pub next_read_timeout: Option<Duration>,

    pub(crate) triggered: bool,
}

impl ReadCallback {
    /// Create a callback that fires on `matcher` and runs `action`.
    pub fn new(name: impl Into<String>, matcher: CallbackMatch, action: CallbackAction) -> Self {
        Self {
            name: name.into(),
            matcher,
            action,
            once: false,
            completes: false,
            reset_output_on_match: true,
            next_read_delay: None,
            next_read_timeout: None,
            triggered: false,
        }
    }

    /// Fire when output contains `needle`.
    pub fn on_contains(
        name: impl Into<String>,
        needle: impl Into<String>,
        action: CallbackAction,
    ) -> Self {
        Self::new(name, CallbackMatch::Contains(needle.into()), action)
    }

    /// Fire when output matches `pattern`.
    pub fn on_pattern(
        name: impl Into<String>,
        pattern: &str,
        action: CallbackAction,
    ) -> std::result::Result<Self, regex::Error> {
        Ok(Self::new(name, CallbackMatch::Pattern(Regex::new(pattern)?), action))
    }

    /// Fire at most once.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Stop the loop after this callback.
    pub fn completes(mut self) -> Self {
        self.completes = true;
        self
    }

    /// Keep accumulated output after this callback fires.
    ///
    /// The callback then matches again on every later chunk unless it is
    /// also [`once`](Self::once).
    pub fn keep_output(mut self) -> Self {
        self.reset_output_on_match = false;
        self
    }

    /// Pause before the next read.
    pub fn with_next_read_delay(mut self, delay: Duration) -> Self {
        self.next_read_delay = Some(delay);
        self
    }

    /// Deadline for the next read.
    pub fn with_next_read_timeout(mut self, timeout: Duration) -> Self {
        self.next_read_timeout = Some(timeout);
        self
    }

    /// Whether this callback may still fire.
    pub fn is_eligible(&self) -> bool {
        !(self.once && self.triggered)
    }
}

impl fmt::Debug for ReadCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCallback")
            .field("name", &self.name)
            .field("once", &self.once)
            .field("completes", &self.completes)
            .field("reset_output_on_match", &self.reset_output_on_match)
            .field("triggered", &self.triggered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchers() {
        assert!(CallbackMatch::Contains("--More--".into()).is_match("a\n--More--"));
        assert!(CallbackMatch::Pattern(Regex::new(r"\[y/n\]").unwrap()).is_match("Proceed? [y/n]"));
        assert!(!CallbackMatch::Custom(Box::new(|s: &str| s.len() > 10)).is_match("short"));
    }

    #[test]
    fn test_once_eligibility() {
        let mut cb = ReadCallback::on_contains("confirm", "[confirm]", CallbackAction::None).once();
        assert!(cb.is_eligible());
        cb.triggered = true;
        assert!(!cb.is_eligible());

        let mut repeat = ReadCallback::on_contains("more", "--More--", CallbackAction::None);
        repeat.triggered = true;
        assert!(repeat.is_eligible());
    }

    #[test]
    fn test_builder_flags() {
        let cb = ReadCallback::on_pattern("tail", r"(?m)^END$", CallbackAction::None)
            .unwrap()
            .keep_output()
            .with_next_read_delay(Duration::from_millis(10))
            .with_next_read_timeout(Duration::from_secs(1));
        assert!(!cb.reset_output_on_match);
        let default = ReadCallback::on_contains("more", "--More--", CallbackAction::None);
        assert!(default.reset_output_on_match);
        assert_eq!(cb.next_read_delay, Some(Duration::from_millis(10)));
        assert_eq!(cb.next_read_timeout, Some(Duration::from_secs(1)));
        assert!(cb.matcher.is_match("line\nEND"));
        assert!(!cb.matcher.is_match("ENDING"));

        assert!(ReadCallback::on_pattern("bad", "(unclosed", CallbackAction::None).is_err());
    }
}
