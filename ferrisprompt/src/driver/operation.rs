//! Operation records.
//!
//! An operation is one logical request against the device. Batches keep
//! every sub-result in a single record, joined with [`OPERATION_DELIMITER`],
//! with one split timestamp per sub-result.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use memchr::memmem;

use super::response::{MultiResponse, Response, ResponseContext};
use crate::channel::ChannelOutput;
use crate::error::Error;

/// Separator between sub-results of a batched operation.
pub const OPERATION_DELIMITER: &str = "__ferrisprompt__";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque operation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the handle.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// What an operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Open,
    Close,
    EnterMode,
    GetPrompt,
    SendInput,
    SendPromptedInput,
    SendInteractive,
    ReadWithCallbacks,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Open => "open",
            OperationKind::Close => "close",
            OperationKind::EnterMode => "enter_mode",
            OperationKind::GetPrompt => "get_prompt",
            OperationKind::SendInput => "send_input",
            OperationKind::SendPromptedInput => "send_prompted_input",
            OperationKind::SendInteractive => "send_interactive",
            OperationKind::ReadWithCallbacks => "read_with_callbacks",
        };
        f.write_str(name)
    }
}

/// One logical request and everything it produced so far.
#[derive(Debug, Clone)]
pub struct Operation {
    id: OperationId,
    kind: OperationKind,
    inputs: String,
    started_at: SystemTime,
    completed: bool,
    splits: Vec<SystemTime>,
    raw_result: Vec<u8>,
    result: String,
    prompts: Vec<String>,
    failures: Vec<Option<String>>,
    error: Option<String>,
}

impl Operation {
    /// Start a new operation now.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: OperationId::next(),
            kind,
            inputs: String::new(),
            started_at: SystemTime::now(),
            completed: false,
            splits: Vec::new(),
            raw_result: Vec::new(),
            result: String::new(),
            prompts: Vec::new(),
            failures: Vec::new(),
            error: None,
        }
    }

    /// Append one sub-result.
    pub fn record(&mut self, input: &str, output: &ChannelOutput, failure: Option<String>) {
        if !self.splits.is_empty() {
            self.inputs.push_str(OPERATION_DELIMITER);
            self.result.push_str(OPERATION_DELIMITER);
            self.raw_result.extend_from_slice(OPERATION_DELIMITER.as_bytes());
        }
        self.inputs.push_str(input);
        self.result.push_str(&output.result);
        self.raw_result.extend_from_slice(&output.raw);
        self.prompts.push(output.prompt.clone());
        self.failures.push(failure);
        self.splits.push(SystemTime::now());
    }

    /// Mark the operation done.
    pub fn finish(&mut self) {
        self.completed = true;
    }

    /// Mark the operation done with an error.
    pub fn fail(&mut self, error: &Error) {
        self.error = Some(error.to_string());
        self.completed = true;
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// End timestamps, one per sub-result.
    pub fn splits(&self) -> &[SystemTime] {
        &self.splits
    }

    /// Number of recorded sub-results.
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Delimited inputs, as recorded.
    pub fn joined_inputs(&self) -> &str {
        &self.inputs
    }

    /// Delimited cleaned results, as recorded.
    pub fn joined_result(&self) -> &str {
        &self.result
    }

    /// Delimited raw output, as recorded.
    pub fn joined_raw_result(&self) -> &[u8] {
        &self.raw_result
    }

    /// Per-input strings.
    pub fn inputs(&self) -> Vec<&str> {
        self.split_text(&self.inputs)
    }

    /// Per-input cleaned results.
    pub fn results(&self) -> Vec<&str> {
        self.split_text(&self.result)
    }

    /// Per-input raw output.
    pub fn raw_results(&self) -> Vec<&[u8]> {
        if self.splits.is_empty() {
            return Vec::new();
        }
        let delimiter = OPERATION_DELIMITER.as_bytes();
        let mut parts = Vec::with_capacity(self.splits.len());
        let mut start = 0;
        for pos in memmem::find_iter(&self.raw_result, delimiter) {
            parts.push(&self.raw_result[start..pos]);
            start = pos + delimiter.len();
        }
        parts.push(&self.raw_result[start..]);
        parts
    }

    /// First failure indicator seen in any sub-result.
    pub fn failed_indicator(&self) -> Option<&str> {
        self.failures.iter().flatten().next().map(String::as_str)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Last split, or one nanosecond after the start when nothing was recorded.
    pub fn end_time(&self) -> SystemTime {
        self.splits
            .last()
            .copied()
            .unwrap_or(self.started_at + Duration::from_nanos(1))
    }

    pub fn elapsed(&self) -> Duration {
        self.end_time()
            .duration_since(self.started_at)
            .unwrap_or_default()
    }

    fn split_text<'a>(&self, text: &'a str) -> Vec<&'a str> {
        if self.splits.is_empty() {
            Vec::new()
        } else {
            text.split(OPERATION_DELIMITER).collect()
        }
    }

    /// One response per sub-result, each timed from the previous split.
    pub(crate) fn to_responses(&self, ctx: &ResponseContext) -> MultiResponse {
        let inputs = self.inputs();
        let results = self.results();
        let raws = self.raw_results();

        let mut start = self.started_at;
        let mut responses = MultiResponse::new();
        for (idx, end) in self.splits.iter().enumerate() {
            responses.push(ctx.response(
                inputs.get(idx).copied().unwrap_or_default(),
                results.get(idx).copied().unwrap_or_default(),
                raws.get(idx).copied().unwrap_or_default(),
                self.prompts.get(idx).map(String::as_str).unwrap_or_default(),
                (start, *end),
                self.failures.get(idx).cloned().flatten(),
            ));
            start = *end;
        }
        responses
    }

    /// The whole operation as a single response.
    pub(crate) fn to_response(&self, ctx: &ResponseContext) -> Response {
        let input = self.inputs().join("\n");
        let result = self.results().join("\n");
        let raw: Vec<u8> = self.raw_results().concat();
        ctx.response(
            &input,
            &result,
            &raw,
            self.prompts.last().map(String::as_str).unwrap_or_default(),
            (self.started_at, self.end_time()),
            self.failed_indicator().map(str::to_string),
        )
    }
}
