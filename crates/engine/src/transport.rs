//! The two ways a pattern run reaches the engine: piping text through
//! the CLI, or streaming over the serve endpoint's chat API. Both sit
//! behind [`EngineTransport`] so the caller picks a backend once and
//! the rest of the app never branches on it.

use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use shared::events::RunStatus;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::shared_client;
use crate::decode::Utf8StreamDecoder;
use crate::filter::LineFilterPipeline;
use crate::sse::{ChatStreamMessage, SseParser};

/// Read size for subprocess output. A tuning choice, not a correctness
/// bound; the decoder and pipeline accept any chunking.
pub const READ_CHUNK_SIZE: usize = 4096;

/// One pattern run: what to transform and with what.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub pattern: String,
    pub model: Option<String>,
    pub input: String,
}

impl TransportRequest {
    pub fn new(pattern: impl Into<String>, model: Option<String>, input: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            model,
            input: input.into(),
        }
    }

    /// The equivalent shell invocation, shown in the UI so users can
    /// reproduce a run by hand.
    pub fn command_preview(&self, command: &str) -> String {
        match &self.model {
            Some(model) => format!("{command} -p {} -m {model}", self.pattern),
            None => format!("{command} -p {}", self.pattern),
        }
    }
}

/// A streaming channel to the engine. Implementations forward output
/// fragments in arrival order, honor the cancellation token at each
/// iteration, and always come back with a terminal status instead of
/// an error the caller has to interpret.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    async fn send(
        &self,
        request: &TransportRequest,
        fragments: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> RunStatus;
}

/// Runs `{command} -p pattern [-m model]` with the input piped to
/// stdin. Stdout and stderr are read concurrently in chunks, decoded
/// incrementally, and noise-filtered per complete line.
pub struct StdioTransport {
    command: String,
}

impl StdioTransport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl EngineTransport for StdioTransport {
    async fn send(
        &self,
        request: &TransportRequest,
        fragments: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> RunStatus {
        let mut command = tokio::process::Command::new(&self.command);
        command.arg("-p").arg(&request.pattern);
        if let Some(model) = &request.model {
            command.arg("-m").arg(model);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(preview = %request.command_preview(&self.command), "starting pattern run");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return RunStatus::Failed {
                    reason: format!("failed to launch `{}`: {err}", self.command),
                }
            }
        };

        // The writer runs concurrently with the readers; with a large
        // input and a chatty engine both pipe buffers can fill at once.
        if let Some(mut stdin) = child.stdin.take() {
            let input = request.input.clone();
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(input.as_bytes()).await {
                    warn!(error = %err, "failed to write engine input");
                }
                // Dropping stdin closes the pipe and lets the engine finish.
            });
        }

        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        if let Some(stdout) = child.stdout.take() {
            spawn_chunk_reader(stdout, chunk_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_chunk_reader(stderr, chunk_tx.clone());
        }
        drop(chunk_tx);

        let mut decoder = Utf8StreamDecoder::new();
        let mut pipeline = LineFilterPipeline::with_engine_noise_filter();
        let mut cancelled = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    info!("pattern run cancelled, stopping engine process");
                    if let Err(err) = child.start_kill() {
                        warn!(error = %err, "failed to kill engine process");
                    }
                    // Keep draining; the readers hit EOF once the kill lands.
                }
                chunk = chunk_rx.recv() => {
                    let Some(bytes) = chunk else { break };
                    let text = decoder.feed(&bytes);
                    if !text.is_empty() {
                        for line in pipeline.push(&text) {
                            let _ = fragments.send(line);
                        }
                    }
                }
            }
        }

        // End of stream: resolve any dangling byte sequence, then the
        // trailing partial line.
        let tail_text = decoder.finish();
        if !tail_text.is_empty() {
            for line in pipeline.push(&tail_text) {
                let _ = fragments.send(line);
            }
        }
        if let Some(rest) = pipeline.flush() {
            let _ = fragments.send(rest);
        }

        if cancelled {
            let _ = child.wait().await;
            return RunStatus::Cancelled;
        }
        match child.wait().await {
            Ok(status) => RunStatus::Completed {
                exit_code: status.code(),
            },
            Err(err) => RunStatus::Failed {
                reason: format!("failed to reap engine process: {err}"),
            },
        }
    }
}

fn spawn_chunk_reader(
    mut stream: impl AsyncRead + Unpin + Send + 'static,
    chunks: UnboundedSender<Vec<u8>>,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if chunks.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

#[derive(Debug, Serialize)]
struct ChatPrompt<'a> {
    #[serde(rename = "userInput")]
    user_input: &'a str,
    vendor: &'a str,
    model: &'a str,
    #[serde(rename = "patternName")]
    pattern_name: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    prompts: Vec<ChatPrompt<'a>>,
}

/// Streams a run through the serve endpoint's `/chat` API as
/// Server-Sent Events.
pub struct HttpTransport {
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl EngineTransport for HttpTransport {
    async fn send(
        &self,
        request: &TransportRequest,
        fragments: UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> RunStatus {
        let body = ChatRequest {
            prompts: vec![ChatPrompt {
                user_input: &request.input,
                vendor: "",
                model: request.model.as_deref().unwrap_or(""),
                pattern_name: &request.pattern,
            }],
        };
        let url = format!("{}/chat", self.base_url);
        info!(%url, pattern = %request.pattern, "starting chat run");
        let response = match shared_client()
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return RunStatus::Failed {
                    reason: format!("chat request failed: {err}"),
                }
            }
        };
        if !response.status().is_success() {
            return RunStatus::Failed {
                reason: format!("chat request rejected: HTTP {}", response.status()),
            };
        }

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("chat run cancelled, dropping stream");
                    return RunStatus::Cancelled;
                }
                chunk = stream.next() => {
                    let Some(chunk) = chunk else { break };
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            return RunStatus::Failed {
                                reason: format!("chat stream interrupted: {err}"),
                            }
                        }
                    };
                    for event in parser.feed(&chunk) {
                        let message: ChatStreamMessage = match serde_json::from_str(&event.data) {
                            Ok(message) => message,
                            Err(err) => {
                                debug!(error = %err, "skipping malformed chat event");
                                continue;
                            }
                        };
                        if message.is_complete() {
                            if !message.content.is_empty() {
                                let _ = fragments.send(message.content);
                            }
                            return RunStatus::Completed { exit_code: Some(0) };
                        }
                        if message.is_content() && !message.content.is_empty() {
                            let _ = fragments.send(message.content);
                        }
                        // Other message kinds carry no displayable output.
                    }
                }
            }
        }
        // The server closed the stream without a complete marker;
        // treat what arrived as the whole answer.
        RunStatus::Completed { exit_code: Some(0) }
    }
}
