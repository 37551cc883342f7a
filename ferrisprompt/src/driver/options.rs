//! Per-call options for driver operations.

use std::time::Duration;

use regex::bytes::Regex;

use crate::channel::{InputHandling, InputOptions};
use crate::error::{DriverError, Result};

/// Options for `send_input` and friends.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Mode to acquire before sending. `None` sends in whatever mode the
    /// session is in.
    pub requested_mode: Option<String>,

    /// Echo confirmation policy. `None` uses the driver default.
    pub input_handling: Option<InputHandling>,

    /// Keep the echoed input in the result.
    pub retain_input: bool,

    /// Keep the trailing prompt in the result.
    pub retain_trailing_prompt: bool,

    /// Timeout for this call only.
    pub timeout: Option<Duration>,

    /// Replace the platform's failure indicators for this call.
    pub failed_when_contains: Option<Vec<String>>,

    /// Stop a batch at the first failed input.
    pub stop_on_failed: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            requested_mode: None,
            input_handling: None,
            retain_input: false,
            retain_trailing_prompt: false,
            timeout: None,
            failed_when_contains: None,
            stop_on_failed: true,
        }
    }
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.requested_mode = Some(mode.into());
        self
    }

    pub fn input_handling(mut self, handling: InputHandling) -> Self {
        self.input_handling = Some(handling);
        self
    }

    pub fn retain_input(mut self, retain: bool) -> Self {
        self.retain_input = retain;
        self
    }

    pub fn retain_trailing_prompt(mut self, retain: bool) -> Self {
        self.retain_trailing_prompt = retain;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn failed_when_contains(mut self, indicators: Vec<String>) -> Self {
        self.failed_when_contains = Some(indicators);
        self
    }

    pub fn stop_on_failed(mut self, stop: bool) -> Self {
        self.stop_on_failed = stop;
        self
    }

    pub(crate) fn input_options(&self, default_handling: InputHandling) -> InputOptions {
        InputOptions {
            handling: self.input_handling.unwrap_or(default_handling),
            retain_input: self.retain_input,
            retain_trailing_prompt: self.retain_trailing_prompt,
        }
    }
}

/// A two-stage exchange: send `input`, wait for a prompt, answer it.
///
/// Exactly one of `prompt` (literal text) and `prompt_pattern` (regex) must
/// be set.
#[derive(Debug, Clone, Default)]
pub struct PromptedInput {
    pub input: String,
    pub prompt: Option<String>,
    pub prompt_pattern: Option<String>,
    pub response: String,
    pub hidden_response: bool,
}

impl PromptedInput {
    pub fn new(input: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            response: response.into(),
            ..Default::default()
        }
    }

    /// Wait for this literal text.
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Wait for this regex.
    pub fn prompt_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.prompt_pattern = Some(pattern.into());
        self
    }

    /// Keep the response out of logs and skip its echo check.
    pub fn hidden(mut self) -> Self {
        self.hidden_response = true;
        self
    }

    /// The regex to wait for, or `InvalidOptions` unless exactly one prompt form is set.
    pub(crate) fn compile_prompt(&self) -> Result<Regex> {
        match (&self.prompt, &self.prompt_pattern) {
            (Some(literal), None) => Ok(Regex::new(&regex::escape(literal))?),
            (None, Some(pattern)) => Regex::new(pattern).map_err(|e| {
                DriverError::InvalidOptions {
                    message: format!("invalid prompt_pattern: {}", e),
                }
                .into()
            }),
            (Some(_), Some(_)) => Err(DriverError::InvalidOptions {
                message: "set either prompt or prompt_pattern, not both".into(),
            }
            .into()),
            (None, None) => Err(DriverError::InvalidOptions {
                message: "one of prompt or prompt_pattern is required".into(),
            }
            .into()),
        }
    }
}
