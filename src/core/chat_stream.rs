//! Streaming chat completions.
//!
//! The gateway streams completions as `text/event-stream`-like lines of
//! `data: <json-chunk>`, terminated by the `data: [DONE]` sentinel. This
//! module owns the line assembly and decoding: it spawns the request,
//! splits the byte stream on newlines, and forwards content fragments over
//! an unbounded channel in arrival order. Lines that are not `data:` framed,
//! and payloads that fail to parse (keep-alives, comments), are skipped
//! without aborting the stream.

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ApiErrorBody, ChatMessage, ChatRequest, ChatResponse};
use crate::core::error::OpenRouterError;
use crate::utils::url::construct_api_url;

/// One event of a streamed completion, tagged with the stream id it belongs
/// to so consumers can discard events from a superseded request.
#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Handle one `data:` payload. Returns true when the stream is finished.
fn handle_data_payload(
    payload: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send((StreamMessage::End, stream_id));
        return true;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(chunk) => {
            if let Some(choice) = chunk.choices.first() {
                if let Some(content) = choice.delta.as_ref().and_then(|d| d.content.as_ref()) {
                    if !content.is_empty() {
                        let _ = tx.send((StreamMessage::Chunk(content.clone()), stream_id));
                    }
                }
            }
        }
        Err(err) => {
            // Heartbeats and comment lines are expected; skip them rather
            // than abort a stream that may still deliver content.
            debug!(stream_id, %err, "skipping undecodable stream line");
        }
    }
    false
}

/// Process one line of the response body. Returns true when the stream is
/// finished. Lines without the `data:` prefix are ignored.
fn process_sse_line(
    line: &str,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(payload, tx, stream_id))
        .unwrap_or(false)
}

/// Assembles body bytes into lines and hands each complete one to the SSE
/// handler. Servers may close the connection without terminating the final
/// line, so [`finish`](Self::finish) must run once the body is exhausted.
struct LineAssembler {
    buffer: Vec<u8>,
}

impl LineAssembler {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append bytes and process any complete lines. Returns true when a
    /// sentinel finished the stream.
    fn push(
        &mut self,
        bytes: &[u8],
        tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
        stream_id: u64,
    ) -> bool {
        self.buffer.extend_from_slice(bytes);
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line = match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(s) => s.trim().to_string(),
                Err(err) => {
                    debug!(stream_id, %err, "invalid UTF-8 in stream");
                    self.buffer.drain(..=newline_pos);
                    continue;
                }
            };
            let should_end = process_sse_line(&line, tx, stream_id);
            self.buffer.drain(..=newline_pos);
            if should_end {
                return true;
            }
        }
        false
    }

    /// Process a final line left unterminated at end of body. Returns true
    /// when that line was the sentinel.
    fn finish(
        &mut self,
        tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
        stream_id: u64,
    ) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        let ended = match std::str::from_utf8(&self.buffer) {
            Ok(s) => process_sse_line(s.trim(), tx, stream_id),
            Err(err) => {
                debug!(stream_id, %err, "invalid UTF-8 in stream");
                false
            }
        };
        self.buffer.clear();
        ended
    }
}

/// Best-effort extraction of the gateway's structured error message from a
/// non-200 response body.
pub(crate) fn error_from_response(status: u16, body: &str) -> OpenRouterError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| "Unknown error".to_string());
    OpenRouterError::Http { status, message }
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub api_messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stream_id: u64,
}

/// Spawns streaming completion requests and fans their events out to a
/// single receiver. The receiver side is handed to whoever drives the
/// session loop.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                base_url,
                api_key,
                model,
                api_messages,
                temperature,
                max_tokens,
                stream_id,
            } = params;

            let request = ChatRequest {
                model,
                messages: api_messages,
                stream: true,
                temperature,
                max_tokens,
            };

            let chat_url = construct_api_url(&base_url, "chat/completions");
            debug!(stream_id, url = %chat_url, "opening completion stream");

            let response = client
                .post(chat_url)
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .header("X-Title", "Dramatis")
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    let _ = tx.send((
                        StreamMessage::Error(OpenRouterError::Network(err).to_string()),
                        stream_id,
                    ));
                    let _ = tx.send((StreamMessage::End, stream_id));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                let error = error_from_response(status, &body);
                let _ = tx.send((StreamMessage::Error(error.to_string()), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }

            let mut stream = response.bytes_stream();
            let mut lines = LineAssembler::new();

            while let Some(chunk) = stream.next().await {
                let chunk_bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        // Connection dropped mid-stream: the fragments sent
                        // so far stand, the failure is reported, and the
                        // stream ends.
                        let _ = tx.send((
                            StreamMessage::Error(OpenRouterError::Network(err).to_string()),
                            stream_id,
                        ));
                        let _ = tx.send((StreamMessage::End, stream_id));
                        return;
                    }
                };

                if lines.push(&chunk_bytes, &tx, stream_id) {
                    return;
                }
            }

            // Server closed the connection; a final line may still sit in the
            // buffer without its newline. Treat the close as normal
            // completion when no [DONE] line arrived.
            if !lines.finish(&tx, stream_id) {
                let _ = tx.send((StreamMessage::End, stream_id));
            }
        });
    }
}
