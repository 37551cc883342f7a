//! The interactive channel: write input, confirm the echo, read to a prompt.
//!
//! Every operation here is a strict write-then-read exchange against one
//! transport. Nothing is pipelined; an exchange's read phase fully resolves
//! before the next write.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use memchr::memchr;
use regex::bytes::Regex;

use super::ansi::strip_ansi;
use super::buffer::ReadBuffer;
use super::callbacks::{CallbackAction, ReadCallback};
use super::patterns::InputHandling;
use super::recorder::{Direction, SessionRecorder};
use crate::driver::InteractiveEvent;
use crate::error::{ChannelError, DriverError, Result, TransportError};
use crate::transport::Transport;

/// Stands in for hidden input in recordings and operation records.
pub(crate) const HIDDEN_INPUT: &str = "<hidden>";

/// Configuration for channel behavior.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Default operation timeout.
    pub timeout: Duration,

    /// Search depth for prompt matching.
    pub search_depth: usize,

    /// Appended to every input.
    pub return_char: String,

    /// Pagination marker (e.g. `--More--`) to acknowledge automatically.
    pub paging_indicator: Option<String>,

    /// Sent when the pagination marker is seen.
    pub paging_escape: String,

    /// Strip ANSI escapes from returned output.
    pub strip_ansi: bool,

    /// Upper bound on a single blocking transport read.
    pub read_poll_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            search_depth: 1000,
            return_char: "\n".to_string(),
            paging_indicator: None,
            paging_escape: " ".to_string(),
            strip_ansi: true,
            read_poll_interval: Duration::from_millis(50),
        }
    }
}

/// Per-exchange input options.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputOptions {
    /// Echo confirmation policy.
    pub handling: InputHandling,

    /// Keep the echoed input line in the cleaned result.
    pub retain_input: bool,

    /// Keep the trailing prompt line in the cleaned result.
    pub retain_trailing_prompt: bool,
}

/// Output of one channel exchange.
#[derive(Debug, Clone, Default)]
pub struct ChannelOutput {
    /// Everything read, untouched.
    pub raw: Vec<u8>,

    /// Cleaned text: echo and trailing prompt removed per options.
    pub result: String,

    /// The trailing prompt line, if the exchange ended on one.
    pub prompt: String,
}

/// Operation deadline.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        self.at
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }
}

/// Input whose echo the read loop should confirm.
#[derive(Debug, Clone, Copy)]
struct Echo<'a> {
    input: &'a [u8],
    handling: InputHandling,
}

#[derive(Debug)]
struct ReadOutcome {
    raw: Vec<u8>,
    matched: usize,
    span: (usize, usize),
    echo_end: Option<usize>,
}

/// Interactive channel over a byte transport.
pub struct PtyChannel {
    transport: Box<dyn Transport>,
    config: ChannelConfig,
    buffer: ReadBuffer,
    prompt_pattern: Regex,
    recorder: Option<SessionRecorder>,
    last_prompt: Option<String>,
    is_open: bool,
    closed: bool,
}

impl PtyChannel {
    /// Create a channel. `prompt_pattern` is the combined pattern of every known mode.
    pub fn new(transport: Box<dyn Transport>, config: ChannelConfig, prompt_pattern: Regex) -> Self {
        Self {
            buffer: ReadBuffer::new(config.search_depth),
            transport,
            config,
            prompt_pattern,
            recorder: None,
            last_prompt: None,
            is_open: false,
            closed: false,
        }
    }

    /// Open the transport.
    pub fn open(&mut self) -> Result<()> {
        self.transport.open()?;
        self.is_open = true;
        self.closed = false;
        self.last_prompt = None;
        self.buffer.clear();
        Ok(())
    }

    /// Close the transport.
    pub fn close(&mut self) {
        if self.is_open {
            self.transport.close();
        }
        self.is_open = false;
        self.last_prompt = None;
        self.buffer.clear();
    }

    /// Check if the channel is open.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Open, not observed closed, and the transport agrees.
    pub fn is_alive(&self) -> bool {
        self.is_open && !self.closed && self.transport.is_alive()
    }

    /// Replace the combined prompt pattern (after the mode table changed).
    pub fn set_prompt_pattern(&mut self, pattern: Regex) {
        self.prompt_pattern = pattern;
    }

    /// The combined prompt pattern.
    pub fn prompt_pattern(&self) -> &Regex {
        &self.prompt_pattern
    }

    /// Get the default timeout.
    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Set the default timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Get the configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Attach a session recorder.
    pub fn set_recorder(&mut self, recorder: Option<SessionRecorder>) {
        self.recorder = recorder;
    }

    /// The prompt the last exchange ended on, if nothing was written since.
    pub fn observed_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    /// Remote host of the transport.
    pub fn host(&self) -> &str {
        self.transport.host()
    }

    /// Remote port of the transport.
    pub fn port(&self) -> u16 {
        self.transport.port()
    }

    fn ensure_usable(&self) -> Result<()> {
        if !self.is_open {
            return Err(TransportError::NotOpened.into());
        }
        if self.closed {
            return Err(ChannelError::Closed.into());
        }
        Ok(())
    }

    fn write_inner(&mut self, data: &[u8], hidden: bool) -> Result<()> {
        self.ensure_usable()?;
        self.last_prompt = None;
        if hidden {
            trace!("write: <{} hidden bytes>", data.len());
            if let Some(recorder) = self.recorder.as_mut() {
                let mut placeholder = HIDDEN_INPUT.as_bytes().to_vec();
                if data.ends_with(self.config.return_char.as_bytes()) {
                    placeholder.extend_from_slice(self.config.return_char.as_bytes());
                }
                recorder.record(Direction::Input, &placeholder);
            }
        } else {
            trace!("write: {:?}", String::from_utf8_lossy(data));
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.record(Direction::Input, data);
            }
        }
        match self.transport.write(data) {
            Ok(()) => Ok(()),
            Err(TransportError::Disconnected) => {
                self.closed = true;
                Err(ChannelError::Closed.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write raw bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.write_inner(data, false)
    }

    /// Write `input` followed by the return character.
    pub fn write_input(&mut self, input: &str, hidden: bool) -> Result<()> {
        let mut data = Vec::with_capacity(input.len() + self.config.return_char.len());
        data.extend_from_slice(input.as_bytes());
        data.extend_from_slice(self.config.return_char.as_bytes());
        self.write_inner(&data, hidden)
    }

    fn read_chunk(&mut self, deadline: &Deadline) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        let Some(remaining) = deadline.remaining() else {
            return Err(ChannelError::OperationTimeout(deadline.budget).into());
        };
        let wait = remaining.min(self.config.read_poll_interval);

        let chunk = match self.transport.read(wait) {
            Ok(chunk) => chunk,
            Err(TransportError::Disconnected) => {
                self.closed = true;
                return Err(ChannelError::Closed.into());
            }
            Err(e) => return Err(e.into()),
        };

        if !chunk.is_empty() {
            trace!("read: {:?}", String::from_utf8_lossy(&chunk));
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.record(Direction::Output, &chunk);
            }
        }
        Ok(chunk)
    }

    fn discard_pending(&mut self) {
        if !self.buffer.is_empty() {
            trace!("discarding {} unread bytes", self.buffer.len());
            self.buffer.clear();
        }
    }

    /// Core read loop: read until one of `patterns` matches.
    ///
    /// `anchored` patterns must match at the end of received data; others
    /// may match anywhere in the tail window. The echo of `echo.input` is
    /// confirmed first when requested; a missing echo is logged and the
    /// search goes ahead without it.
    fn read_until_any(
        &mut self,
        patterns: &[&Regex],
        echo: Option<Echo<'_>>,
        anchored: bool,
        deadline: &Deadline,
    ) -> Result<ReadOutcome> {
        let mut echo_pending =
            echo.filter(|e| e.handling != InputHandling::Ignore && !e.input.is_empty());
        let mut echo_end = None;

        loop {
            let chunk = self.read_chunk(deadline)?;
            if chunk.is_empty() {
                continue;
            }
            self.buffer.extend(&chunk);

            if let Some(e) = echo_pending {
                if let Some(end) = e.handling.echo_end(self.buffer.as_slice(), e.input) {
                    echo_end = Some(end);
                    echo_pending = None;
                } else if self.buffer.len() > e.input.len() + self.buffer.search_depth() {
                    debug!("input echo not observed within search depth, continuing");
                    echo_pending = None;
                }
            }
            let floor = echo_end.unwrap_or(0);

            if let Some(indicator) = self.config.paging_indicator.clone() {
                if self.buffer.remove_from_tail(indicator.as_bytes(), floor) {
                    debug!("paging indicator {:?} seen, continuing output", indicator);
                    let escape = self.config.paging_escape.clone();
                    self.write(escape.as_bytes())?;
                    continue;
                }
            }

            for (idx, pattern) in patterns.iter().enumerate() {
                let found = if anchored {
                    self.buffer.search_tail(pattern, floor)
                } else {
                    self.buffer.search_tail_anywhere(pattern, floor)
                };
                if let Some(span) = found {
                    if echo_pending.is_some() {
                        debug!("pattern matched before input echo was observed");
                    }
                    return Ok(ReadOutcome {
                        raw: self.buffer.take(),
                        matched: idx,
                        span,
                        echo_end,
                    });
                }
            }
        }
    }

    /// Read until `pattern` matches at the end of received data.
    pub fn read_until(&mut self, pattern: &Regex) -> Result<Vec<u8>> {
        let deadline = Deadline::after(self.config.timeout);
        self.last_prompt = None;
        Ok(self.read_until_any(&[pattern], None, true, &deadline)?.raw)
    }

    /// Read until any of `patterns` matches anywhere in the tail window.
    ///
    /// Returns the bytes read and the index of the pattern that matched.
    pub fn read_until_first_of(&mut self, patterns: &[&Regex]) -> Result<(Vec<u8>, usize)> {
        let deadline = Deadline::after(self.config.timeout);
        self.last_prompt = None;
        let outcome = self.read_until_any(patterns, None, false, &deadline)?;
        Ok((outcome.raw, outcome.matched))
    }

    /// Send a bare return and return the prompt the device answers with.
    pub fn get_prompt(&mut self) -> Result<String> {
        let deadline = Deadline::after(self.config.timeout);
        self.discard_pending();
        let return_char = self.config.return_char.clone();
        self.write(return_char.as_bytes())?;

        let pattern = self.prompt_pattern.clone();
        let outcome = self.read_until_any(&[&pattern], None, true, &deadline)?;
        let prompt = self.last_line(&outcome.raw);
        self.last_prompt = Some(prompt.clone());
        Ok(prompt)
    }

    /// Send one input and read until `prompt` (or the combined prompt).
    pub fn send_input(
        &mut self,
        input: &str,
        prompt: Option<&Regex>,
        options: &InputOptions,
    ) -> Result<ChannelOutput> {
        let deadline = Deadline::after(self.config.timeout);
        let pattern = prompt.cloned().unwrap_or_else(|| self.prompt_pattern.clone());

        self.discard_pending();
        self.write_input(input, false)?;

        let echo = Echo {
            input: input.as_bytes(),
            handling: options.handling,
        };
        let outcome = self.read_until_any(&[&pattern], Some(echo), true, &deadline)?;
        let output = self.finish(&outcome, options, true);
        Ok(self.observe(output))
    }

    /// Two-stage exchange: send `input`, wait for `prompt`, answer with `response`.
    ///
    /// The exchange ends at `mode_prompt` (or the combined prompt). A hidden
    /// response skips echo confirmation and is kept out of logs and recordings.
    pub fn send_prompted_input(
        &mut self,
        input: &str,
        prompt: &Regex,
        response: &str,
        hidden_response: bool,
        mode_prompt: Option<&Regex>,
        options: &InputOptions,
    ) -> Result<ChannelOutput> {
        let deadline = Deadline::after(self.config.timeout);
        let mode_pattern = mode_prompt
            .cloned()
            .unwrap_or_else(|| self.prompt_pattern.clone());

        self.discard_pending();
        self.write_input(input, false)?;
        let first = self.read_until_any(
            &[prompt],
            Some(Echo {
                input: input.as_bytes(),
                handling: options.handling,
            }),
            false,
            &deadline,
        )?;

        self.write_input(response, hidden_response)?;
        let handling = if hidden_response {
            InputHandling::Ignore
        } else {
            options.handling
        };
        let second = self.read_until_any(
            &[&mode_pattern],
            Some(Echo {
                input: response.as_bytes(),
                handling,
            }),
            true,
            &deadline,
        )?;

        let first = self.finish(&first, options, false);
        let second = self.finish(&second, options, true);
        Ok(self.observe(join_outputs(vec![first, second])))
    }

    /// Chain prompted exchanges; the last event's pattern is the closing prompt.
    pub fn send_inputs_interact(
        &mut self,
        events: &[InteractiveEvent],
        options: &InputOptions,
    ) -> Result<Vec<ChannelOutput>> {
        if events.is_empty() {
            return Err(DriverError::InvalidOptions {
                message: "interactive sequence needs at least one event".into(),
            }
            .into());
        }

        let overall = Deadline::after(self.config.timeout);
        let mut outputs = Vec::with_capacity(events.len());
        self.discard_pending();

        for (idx, event) in events.iter().enumerate() {
            let last = idx + 1 == events.len();
            let deadline = event.timeout.map(Deadline::after).unwrap_or(overall);
            if event.hidden {
                debug!("interactive step {}: <hidden input>", idx);
            } else {
                debug!("interactive step {}: {:?}", idx, event.input);
            }

            self.write_input(&event.input, event.hidden)?;
            let handling = if event.hidden {
                InputHandling::Ignore
            } else {
                options.handling
            };
            let outcome = self.read_until_any(
                &[&event.pattern],
                Some(Echo {
                    input: event.input.as_bytes(),
                    handling,
                }),
                last,
                &deadline,
            )?;
            let output = self.finish(&outcome, options, last);
            outputs.push(if last { self.observe(output) } else { output });
        }

        Ok(outputs)
    }

    /// Read in a loop, dispatching to the first matching eligible callback.
    ///
    /// Ends when a `completes` callback fires, the deadline passes, or the
    /// channel closes.
    pub fn read_with_callbacks(
        &mut self,
        initial_input: Option<&str>,
        callbacks: &mut [ReadCallback],
    ) -> Result<ChannelOutput> {
        if callbacks.is_empty() {
            return Err(DriverError::InvalidOptions {
                message: "read_with_callbacks needs at least one callback".into(),
            }
            .into());
        }

        let mut deadline = Deadline::after(self.config.timeout);
        self.discard_pending();
        self.last_prompt = None;
        if let Some(input) = initial_input {
            self.write_input(input, false)?;
        }

        let mut raw = Vec::new();
        loop {
            let chunk = self.read_chunk(&deadline)?;
            if chunk.is_empty() {
                continue;
            }
            raw.extend_from_slice(&chunk);
            self.buffer.extend(&chunk);

            let text = self.render(self.buffer.as_slice());
            let Some(callback) = callbacks
                .iter_mut()
                .find(|cb| cb.is_eligible() && cb.matcher.is_match(&text))
            else {
                continue;
            };

            debug!("read_with_callbacks: '{}' matched", callback.name);
            callback.triggered = true;
            match &mut callback.action {
                CallbackAction::None => {}
                CallbackAction::SendInput(input) => {
                    let input = input.clone();
                    self.write_input(&input, false)?;
                }
                CallbackAction::Write(bytes) => {
                    let bytes = bytes.clone();
                    self.write(&bytes)?;
                }
                CallbackAction::Custom(action) => action(self, &text)?,
            }

            if callback.completes {
                break;
            }
            if callback.reset_output_on_match {
                self.buffer.clear();
            }
            if let Some(delay) = callback.next_read_delay {
                std::thread::sleep(delay);
            }
            if let Some(timeout) = callback.next_read_timeout {
                deadline = Deadline::after(timeout);
            }
        }

        self.buffer.clear();
        let result = self.clean(&raw, None, None);
        Ok(ChannelOutput {
            raw,
            result,
            prompt: String::new(),
        })
    }

    fn observe(&mut self, output: ChannelOutput) -> ChannelOutput {
        if !output.prompt.is_empty() {
            self.last_prompt = Some(output.prompt.clone());
        }
        output
    }

    fn finish(&self, outcome: &ReadOutcome, options: &InputOptions, at_prompt: bool) -> ChannelOutput {
        let raw = &outcome.raw;
        let prompt_start = (at_prompt && !options.retain_trailing_prompt)
            .then(|| line_start(raw, outcome.span.0));
        let echo_end = if options.retain_input {
            None
        } else {
            outcome.echo_end
        };

        ChannelOutput {
            result: self.clean(raw, echo_end, prompt_start),
            prompt: if at_prompt {
                self.last_line(raw)
            } else {
                String::new()
            },
            raw: raw.clone(),
        }
    }

    /// Cut the echo and prompt out of `raw`, strip escapes, normalize newlines.
    fn clean(&self, raw: &[u8], echo_end: Option<usize>, prompt_start: Option<usize>) -> String {
        let end = prompt_start.unwrap_or(raw.len());
        let mut start = echo_end.unwrap_or(0).min(end);

        // Drop the rest of the echoed line when nothing but whitespace follows
        if echo_end.is_some() {
            if let Some(nl) = memchr(b'\n', &raw[start..end]) {
                if raw[start..start + nl].iter().all(|b| b.is_ascii_whitespace()) {
                    start += nl + 1;
                }
            }
        }

        let text = self.render(&raw[start..end]);
        text.trim_start_matches(['\r', '\n']).trim_end().to_string()
    }

    fn render(&self, data: &[u8]) -> String {
        let data = if self.config.strip_ansi {
            strip_ansi(data)
        } else {
            data.to_vec()
        };
        String::from_utf8_lossy(&data)
            .replace("\r\n", "\n")
            .replace('\r', "")
    }

    fn last_line(&self, raw: &[u8]) -> String {
        self.render(raw)
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

impl Drop for PtyChannel {
    fn drop(&mut self) {
        if self.is_open {
            warn!("channel to {} dropped while open; closing", self.host());
            self.close();
        }
    }
}

/// Start of the line containing `pos`.
fn line_start(data: &[u8], pos: usize) -> usize {
    data[..pos]
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0)
}

fn join_outputs(outputs: Vec<ChannelOutput>) -> ChannelOutput {
    let mut joined = ChannelOutput::default();
    let mut parts = Vec::with_capacity(outputs.len());
    for output in outputs {
        joined.raw.extend_from_slice(&output.raw);
        if !output.result.is_empty() {
            parts.push(output.result);
        }
        if !output.prompt.is_empty() {
            joined.prompt = output.prompt;
        }
    }
    joined.result = parts.join("\n");
    joined
}
