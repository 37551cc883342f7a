//! Response types for command execution results.

use std::fmt;
use std::ops::Index;
use std::time::{Duration, SystemTime};

/// Response from a single input.
#[derive(Debug, Clone)]
pub struct Response {
    /// Remote host.
    pub host: String,

    /// Remote port.
    pub port: u16,

    /// The input that was sent.
    pub input: String,

    /// The output with echo and trailing prompt removed.
    pub result: String,

    /// Everything read, untouched.
    pub raw_result: Vec<u8>,

    /// The prompt that was matched at the end.
    pub prompt: String,

    /// When the exchange started.
    pub start_time: SystemTime,

    /// When the exchange finished.
    pub end_time: SystemTime,

    /// Time taken.
    pub elapsed: Duration,

    /// The failure indicator found in the output, if any.
    pub failure_message: Option<String>,

    /// TextFSM platform tag of the session's platform.
    pub textfsm_platform: Option<String>,

    /// Genie platform tag of the session's platform.
    pub genie_platform: Option<String>,
}

impl Response {
    /// Check if the response indicates success.
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }

    /// Check if a failure indicator appeared in the output.
    pub fn failed(&self) -> bool {
        self.failure_message.is_some()
    }

    /// Get the result lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.result.lines()
    }

    /// Check if the result contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.result.contains(pattern)
    }

    /// Raw output as (lossy) text.
    pub fn raw_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_result).into_owned()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.result)
    }
}

/// Ordered responses from a batch.
#[derive(Debug, Clone, Default)]
pub struct MultiResponse {
    responses: Vec<Response>,
}

impl MultiResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, response: Response) {
        self.responses.push(response);
    }

    /// Append another batch, keeping order.
    pub fn extend(&mut self, other: MultiResponse) {
        self.responses.extend(other.responses);
    }

    /// True if any response failed.
    pub fn failed(&self) -> bool {
        self.responses.iter().any(Response::failed)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Response> {
        self.responses.iter()
    }

    pub fn first(&self) -> Option<&Response> {
        self.responses.first()
    }

    pub fn last(&self) -> Option<&Response> {
        self.responses.last()
    }

    /// Cleaned results joined by newlines.
    pub fn result(&self) -> String {
        self.responses
            .iter()
            .map(|r| r.result.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Elapsed from the first start to the last end.
    pub fn elapsed(&self) -> Duration {
        match (self.responses.first(), self.responses.last()) {
            (Some(first), Some(last)) => last
                .end_time
                .duration_since(first.start_time)
                .unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    pub fn into_vec(self) -> Vec<Response> {
        self.responses
    }
}

impl Index<usize> for MultiResponse {
    type Output = Response;

    fn index(&self, idx: usize) -> &Response {
        &self.responses[idx]
    }
}

impl IntoIterator for MultiResponse {
    type Item = Response;
    type IntoIter = std::vec::IntoIter<Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.responses.into_iter()
    }
}

impl<'a> IntoIterator for &'a MultiResponse {
    type Item = &'a Response;
    type IntoIter = std::slice::Iter<'a, Response>;

    fn into_iter(self) -> Self::IntoIter {
        self.responses.iter()
    }
}

impl FromIterator<Response> for MultiResponse {
    fn from_iter<I: IntoIterator<Item = Response>>(iter: I) -> Self {
        Self {
            responses: iter.into_iter().collect(),
        }
    }
}

/// Session metadata stamped on every response.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResponseContext {
    pub host: String,
    pub port: u16,
    pub textfsm_platform: Option<String>,
    pub genie_platform: Option<String>,
}

impl ResponseContext {
    pub(crate) fn response(
        &self,
        input: &str,
        result: &str,
        raw: &[u8],
        prompt: &str,
        (start_time, end_time): (SystemTime, SystemTime),
        failure_message: Option<String>,
    ) -> Response {
        Response {
            host: self.host.clone(),
            port: self.port,
            input: input.to_string(),
            result: result.to_string(),
            raw_result: raw.to_vec(),
            prompt: prompt.to_string(),
            start_time,
            end_time,
            elapsed: end_time.duration_since(start_time).unwrap_or_default(),
            failure_message,
            textfsm_platform: self.textfsm_platform.clone(),
            genie_platform: self.genie_platform.clone(),
        }
    }
}

/// First indicator contained in `output`.
pub(crate) fn detect_failure<'a>(
    output: &str,
    indicators: impl IntoIterator<Item = &'a String>,
) -> Option<String> {
    indicators
        .into_iter()
        .find(|indicator| !indicator.is_empty() && output.contains(indicator.as_str()))
        .cloned()
}
