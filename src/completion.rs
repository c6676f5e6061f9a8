// src/completion.rs

use crate::api::{extract_error_message, ApiClient};
use crate::errors::{ParleyError, ParleyResult};
use crate::models::{CompletionOutput, CompletionRequest};
use futures::StreamExt;
use log::{debug, trace};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

const GENERATE_ENDPOINT: &str = "/api/backends/chat-completions/generate";
const SSE_DATA_PREFIX: &str = "data: ";
const SSE_DONE: &str = "[DONE]";

/// Snapshot handed to the per-chunk callback: the *cumulative* text (and
/// reasoning, once any arrived) seen so far, not the raw delta, so the
/// caller can render a monotonically growing transcript without keeping
/// state of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub text: String,
    pub reasoning: Option<String>,
}

/// The response shapes different server backends put on the wire, tried
/// in this order. First shape that yields a fragment wins.
#[derive(Debug, Clone, Copy)]
enum StreamShape {
    /// OpenAI streaming: `choices[0].delta.content`.
    OpenAiDelta,
    /// OpenAI non-delta streaming: `choices[0].text`.
    OpenAiText,
    /// TextGen-style single-field token: `token`.
    TextGenToken,
}

const SHAPE_PRIORITY: [StreamShape; 3] = [
    StreamShape::OpenAiDelta,
    StreamShape::OpenAiText,
    StreamShape::TextGenToken,
];

fn first_choice(frame: &Value) -> Option<&Value> {
    frame.get("choices")?.as_array()?.first()
}

fn extract_text_fragment(frame: &Value) -> Option<&str> {
    SHAPE_PRIORITY.iter().find_map(|shape| match shape {
        StreamShape::OpenAiDelta => first_choice(frame)?
            .get("delta")?
            .get("content")?
            .as_str(),
        StreamShape::OpenAiText => first_choice(frame)?.get("text")?.as_str(),
        StreamShape::TextGenToken => frame.get("token")?.as_str(),
    })
}

fn extract_reasoning_fragment(frame: &Value) -> Option<&str> {
    let choice = first_choice(frame)?;
    choice
        .get("delta")
        .and_then(|d| d.get("reasoning"))
        .and_then(Value::as_str)
        .or_else(|| choice.get("reasoning").and_then(Value::as_str))
}

fn frame_error(frame: &Value) -> Option<String> {
    let error = frame.get("error")?;
    match error {
        Value::Null | Value::Bool(false) => None,
        _ => Some(
            error
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| error.as_str())
                .unwrap_or("stream error")
                .to_string(),
        ),
    }
}

/// One parser event.
#[derive(Debug, Clone, PartialEq)]
enum SseStep {
    Chunk(StreamChunk),
    Done,
    Error(String),
}

/// Incremental SSE parser and text accumulator.
///
/// Fed raw bytes in whatever chunking the network produced. Complete
/// lines are split off at `\n`; the trailing fragment stays buffered for
/// the next read. Splitting at the newline byte is UTF-8 safe (no
/// multi-byte sequence contains 0x0A), so decoding is stable under
/// arbitrary chunk boundaries.
#[derive(Default)]
struct SseAccumulator {
    buffer: Vec<u8>,
    content: String,
    reasoning: String,
}

impl SseAccumulator {
    fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> StreamChunk {
        StreamChunk {
            text: self.content.clone(),
            reasoning: if self.reasoning.is_empty() {
                None
            } else {
                Some(self.reasoning.clone())
            },
        }
    }

    fn output(self) -> CompletionOutput {
        CompletionOutput {
            content: self.content,
            reasoning: if self.reasoning.is_empty() {
                None
            } else {
                Some(self.reasoning)
            },
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Vec<SseStep> {
        self.buffer.extend_from_slice(bytes);

        let mut steps = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..pos.min(line_bytes.len())]);
            let line = line.trim_end_matches('\r');

            match self.process_line(line) {
                Some(step @ (SseStep::Done | SseStep::Error(_))) => {
                    steps.push(step);
                    return steps;
                }
                Some(step) => steps.push(step),
                None => {}
            }
        }
        steps
    }

    fn process_line(&mut self, line: &str) -> Option<SseStep> {
        // Blank keep-alives and non-data framing lines are expected.
        let payload = line.strip_prefix(SSE_DATA_PREFIX)?.trim();

        if payload == SSE_DONE {
            return Some(SseStep::Done);
        }

        let frame: Value = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(_) => {
                // Best-effort tolerance: a frame the line buffer did not
                // reassemble cleanly is skipped, not fatal.
                trace!("skipping unparseable stream frame");
                return None;
            }
        };

        if let Some(message) = frame_error(&frame) {
            return Some(SseStep::Error(message));
        }

        let mut emitted = false;
        if let Some(fragment) = extract_text_fragment(&frame) {
            if !fragment.is_empty() {
                self.content.push_str(fragment);
                emitted = true;
            }
        }
        if let Some(fragment) = extract_reasoning_fragment(&frame) {
            if !fragment.is_empty() {
                self.reasoning.push_str(fragment);
                emitted = true;
            }
        }

        emitted.then(|| SseStep::Chunk(self.snapshot()))
    }
}

fn request_body(request: &CompletionRequest, stream: bool) -> ParleyResult<Value> {
    let mut body = serde_json::to_value(request)?;
    body["stream"] = Value::Bool(stream);
    Ok(body)
}

fn extract_oneshot_content(data: &Value) -> String {
    // Fixed priority: OpenAI message, TextGen results, bare content.
    if let Some(content) = first_choice(data)
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return content.to_string();
    }
    if let Some(text) = data
        .get("results")
        .and_then(|r| r.as_array())
        .and_then(|a| a.first())
        .and_then(|r| r.get("text"))
        .and_then(Value::as_str)
    {
        return text.to_string();
    }
    data.get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn extract_oneshot_reasoning(data: &Value) -> Option<String> {
    first_choice(data)
        .and_then(|c| c.get("reasoning"))
        .and_then(Value::as_str)
        .or_else(|| data.get("reasoning").and_then(Value::as_str))
        .map(str::to_string)
}

/// One-shot generation: a single JSON response, no streaming.
pub async fn generate(
    api: &ApiClient,
    request: &CompletionRequest,
) -> ParleyResult<CompletionOutput> {
    let body = request_body(request, false)?;
    let data = api.post(GENERATE_ENDPOINT, &body).await?;

    Ok(CompletionOutput {
        content: extract_oneshot_content(&data),
        reasoning: extract_oneshot_reasoning(&data),
    })
}

/// Streaming generation.
///
/// Opens one long-lived response and feeds every decoded fragment through
/// `on_chunk` as a cumulative [`StreamChunk`]. Fails before the first
/// callback when the initial status is not success. A mid-stream error
/// frame aborts with that message; fragments already delivered stay
/// delivered (the caller decides what to do with partial output). The
/// cancellation token stops the read loop at the next suspension point;
/// the response body is released on every exit path.
pub async fn generate_stream<F>(
    api: &ApiClient,
    request: &CompletionRequest,
    cancel: Option<&CancellationToken>,
    mut on_chunk: F,
) -> ParleyResult<CompletionOutput>
where
    F: FnMut(StreamChunk),
{
    let body = request_body(request, true)?;
    let response = api.post_raw(GENERATE_ENDPOINT, &body).await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(ParleyError::api_error(
            status.as_u16(),
            extract_error_message(status.as_u16(), &text),
        ));
    }

    let mut stream = response.bytes_stream();
    let mut acc = SseAccumulator::new();

    loop {
        let next = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("generation stream cancelled");
                    break;
                }
                chunk = stream.next() => chunk,
            },
            None => stream.next().await,
        };

        let Some(chunk) = next else {
            break;
        };

        for step in acc.feed(&chunk?) {
            match step {
                SseStep::Chunk(snapshot) => on_chunk(snapshot),
                SseStep::Done => return Ok(acc.output()),
                SseStep::Error(message) => return Err(ParleyError::stream_error(message)),
            }
        }
    }

    Ok(acc.output())
}
