//! Interactive command support for handling prompts that require user input.
//!
//! Many network device commands require confirmation or additional input:
//! - `reload` asks "Proceed with reload? [confirm]"
//! - `copy running-config startup-config` asks for a destination filename
//! - `enable` asks for a password
//!
//! `send_interactive` sends a sequence of inputs, each waiting for a
//! specific pattern before the next one goes out. The last event's pattern
//! should be the mode prompt that ends the exchange.

use std::time::Duration;

use regex::bytes::Regex;

use crate::error::Result;

/// An event in an interactive command sequence.
///
/// # Example
///
/// ```rust
/// use ferrisprompt::driver::InteractiveEvent;
///
/// # fn example() -> Result<(), regex::Error> {
/// let events = vec![
///     InteractiveEvent::new("reload", r"Proceed.*\[confirm\]")?,
///     InteractiveEvent::new("y", r"#\s*$")?,
/// ];
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InteractiveEvent {
    /// The input to send (command or response).
    pub input: String,

    /// Pattern to wait for after sending input.
    pub pattern: Regex,

    /// Keep the input out of logs and recordings, and skip its echo check.
    pub hidden: bool,

    /// Optional timeout override for this specific event.
    pub timeout: Option<Duration>,
}

impl InteractiveEvent {
    /// Create a new interactive event.
    pub fn new(input: impl Into<String>, pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            input: input.into(),
            pattern: Regex::new(pattern)?,
            hidden: false,
            timeout: None,
        })
    }

    /// Create an event for hidden input (like passwords).
    pub fn hidden(
        input: impl Into<String>,
        pattern: &str,
    ) -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            hidden: true,
            ..Self::new(input, pattern)?
        })
    }

    /// Set a custom timeout for this event.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark this event's input as hidden.
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// Builder for creating interactive command sequences.
///
/// # Example
///
/// ```rust
/// use ferrisprompt::driver::InteractiveBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), ferrisprompt::Error> {
/// let events = InteractiveBuilder::new()
///     .send("copy running-config startup-config")
///     .expect(r"Destination filename")?
///     .send("")
///     .expect(r"#\s*$")?
///     .with_timeout(Duration::from_secs(60))
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InteractiveBuilder {
    events: Vec<InteractiveEvent>,
    default_timeout: Option<Duration>,
}

impl InteractiveBuilder {
    /// Create a new interactive builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an input to send. Must be followed by `expect()`.
    pub fn send(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: false,
            timeout: None,
        }
    }

    /// Add a hidden input (like a password).
    pub fn send_hidden(self, input: impl Into<String>) -> InteractiveBuilderWithInput {
        InteractiveBuilderWithInput {
            builder: self,
            input: input.into(),
            hidden: true,
            timeout: None,
        }
    }

    /// Set the default timeout for events that have none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        for event in &mut self.events {
            event.timeout.get_or_insert(timeout);
        }
        self
    }

    /// Build the list of interactive events.
    pub fn build(self) -> Vec<InteractiveEvent> {
        self.events
    }
}

/// Intermediate state for the builder after `send()` is called.
#[derive(Debug)]
pub struct InteractiveBuilderWithInput {
    builder: InteractiveBuilder,
    input: String,
    hidden: bool,
    timeout: Option<Duration>,
}

impl InteractiveBuilderWithInput {
    /// Specify the pattern to wait for after sending the input.
    pub fn expect(mut self, pattern: &str) -> Result<InteractiveBuilder> {
        let mut event = InteractiveEvent::new(self.input, pattern)?.with_hidden(self.hidden);
        if let Some(timeout) = self.timeout.or(self.builder.default_timeout) {
            event = event.with_timeout(timeout);
        }
        self.builder.events.push(event);
        Ok(self.builder)
    }

    /// Set a custom timeout for this specific event.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
