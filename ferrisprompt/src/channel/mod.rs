//! Channel layer: buffered reads, prompt and echo detection, interactive exchanges.
//!
//! This module turns a raw byte transport into request/response framing
//! over a terminal that echoes input and never frames its output.

mod ansi;
mod buffer;
mod callbacks;
mod patterns;
mod pty;
mod recorder;

pub use ansi::strip_ansi;
pub use buffer::ReadBuffer;
pub use callbacks::{CallbackAction, CallbackMatch, ReadCallback};
pub use patterns::{
    InputHandling, combine_patterns, compile_prompt_pattern, exact_match_end,
    find_prompt_at_end, fuzzy_match_end,
};
pub(crate) use pty::HIDDEN_INPUT;
pub use pty::{ChannelConfig, ChannelOutput, InputOptions, PtyChannel};
pub use recorder::{Direction, SessionRecorder};
