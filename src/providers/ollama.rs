use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::app_config::{BackendConfig, DEFAULT_MODEL, DEFAULT_TARGET_LANGUAGE};
use crate::errors::ServiceError;
use crate::events::{Event, EventBus};
use crate::prompt::build_prompt;
use crate::providers::StreamingService;

/// Generate request for the Ollama API
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    /// How long to keep the model loaded in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

/// Generation options for the Ollama API
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// One line of a streamed generation response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationChunk {
    /// Generated text fragment
    #[serde(default)]
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Error reported mid-stream by the server
    #[serde(default)]
    pub error: Option<String>,
}

impl GenerationRequest {
    /// Create a new streaming generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
            stream: Some(true),
            keep_alive: None,
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options = Some(GenerationOptions {
            temperature: Some(temperature),
        });
        self
    }

    /// Set the keep-alive duration
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Splits a byte stream into newline-delimited JSON lines
#[derive(Debug, Default)]
struct NdjsonDecoder {
    buffer: BytesMut,
}

impl NdjsonDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.split();
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// How a stream ended when no error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    Completed { received_any: bool },
    Cancelled,
}

#[derive(Debug)]
struct ActiveRequest {
    id: Uuid,
    cancel_tx: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct ServiceState {
    active: Mutex<Option<ActiveRequest>>,
    initial_input: Mutex<Option<String>>,
}

impl ServiceState {
    // @returns: true if `id` still owned the slot
    fn release(&self, id: Uuid) -> bool {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|request| request.id == id) {
            *active = None;
            true
        } else {
            false
        }
    }
}

/// Streaming translation backend on top of a local Ollama server
#[derive(Debug)]
pub struct OllamaStreamingService {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Where chunk, terminal and log events are published
    bus: EventBus,
    /// Keep-alive passed through to Ollama
    keep_alive: Option<String>,
    /// Sampling temperature passed through to Ollama
    temperature: Option<f32>,
    state: Arc<ServiceState>,
}

impl OllamaStreamingService {
    /// Create a service for the Ollama server at `endpoint`
    pub fn new(endpoint: impl Into<String>, bus: EventBus) -> Self {
        Self::with_client(endpoint, bus, Duration::from_secs(10))
    }

    /// Create a service from the backend section of the configuration
    pub fn from_config(config: &BackendConfig, bus: EventBus) -> Self {
        let mut service = Self::with_client(
            config.endpoint.clone(),
            bus,
            Duration::from_secs(config.connect_timeout_secs),
        );
        service.keep_alive = config.keep_alive.clone();
        service.temperature = config.temperature;
        service
    }

    fn with_client(endpoint: impl Into<String>, bus: EventBus, connect_timeout: Duration) -> Self {
        let base_url = endpoint.into().trim_end_matches('/').to_string();

        Self {
            base_url,
            // No overall timeout: a generation streams for as long as the model talks
            client: Client::builder()
                .connect_timeout(connect_timeout)
                .http1_only()
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            bus,
            keep_alive: None,
            temperature: None,
            state: Arc::new(ServiceState::default()),
        }
    }

    /// Queue text given at process start for `take_initial_input`
    pub fn with_initial_input(self, input: impl Into<String>) -> Self {
        let input = input.into();
        if !input.trim().is_empty() {
            *self.state.initial_input.lock() = Some(input);
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a request currently owns the backend
    pub fn is_running(&self) -> bool {
        self.state.active.lock().is_some()
    }

    /// Get the Ollama API version
    pub async fn version(&self) -> Result<String> {
        let url = format!("{}/api/version", self.base_url);
        let response: serde_json::Value = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("Failed to connect to Ollama")?
            .json()
            .await
            .context("Failed to parse Ollama version response")?;

        let version = response["version"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid version format in response"))?
            .to_string();

        Ok(version)
    }

    fn build_request(&self, text: &str, model: &str, target_language: &str) -> GenerationRequest {
        let mut request = GenerationRequest::new(model, build_prompt(text, target_language));
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }
        if let Some(keep_alive) = &self.keep_alive {
            request = request.keep_alive(keep_alive.clone());
        }
        request
    }
}

fn emit_log(bus: &EventBus, message: impl Into<String>) {
    let message = message.into();
    trace!("{}", message);
    bus.publish(Event::Log(message));
}

/// Resolves once cancellation has been requested
async fn wait_for_cancel(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn apply_line(line: &str, bus: &EventBus, received_any: &mut bool) -> Result<(), String> {
    let chunk: GenerationChunk = serde_json::from_str(line).map_err(|e| {
        let preview: String = line.chars().take(200).collect();
        format!("Failed to parse Ollama stream line: {}. Line: {}", e, preview)
    })?;

    if let Some(message) = chunk.error {
        return Err(message);
    }
    if !chunk.response.is_empty() {
        *received_any = true;
        bus.publish(Event::Chunk(chunk.response));
    }
    Ok(())
}

async fn stream_generation(
    client: &Client,
    url: &str,
    request: &GenerationRequest,
    bus: &EventBus,
    mut cancel_rx: watch::Receiver<bool>,
) -> Result<StreamOutcome, String> {
    let response = tokio::select! {
        sent = client.post(url).json(request).send() => {
            sent.map_err(|e| format!("Failed to send request to Ollama API: {}", e))?
        }
        _ = wait_for_cancel(&mut cancel_rx) => {
            emit_log(bus, "cancel signal received");
            return Ok(StreamOutcome::Cancelled);
        }
    };

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to get error response text".to_string());
        error!("Ollama API error ({}): {}", status, error_text);
        return Err(format!("Ollama API error ({}): {}", status, error_text));
    }

    let mut stream = response.bytes_stream();
    let mut decoder = NdjsonDecoder::default();
    let mut received_any = false;

    loop {
        tokio::select! {
            next = stream.next() => {
                match next {
                    Some(Ok(bytes)) => {
                        for line in decoder.push(&bytes) {
                            apply_line(&line, bus, &mut received_any)?;
                        }
                    }
                    Some(Err(e)) => return Err(format!("failed to read stream: {}", e)),
                    None => {
                        emit_log(bus, "stream closed");
                        break;
                    }
                }
            }
            _ = wait_for_cancel(&mut cancel_rx) => {
                emit_log(bus, "cancel signal received");
                return Ok(StreamOutcome::Cancelled);
            }
        }
    }

    if let Some(line) = decoder.finish() {
        apply_line(&line, bus, &mut received_any)?;
    }

    Ok(StreamOutcome::Completed { received_any })
}

#[async_trait]
impl StreamingService for OllamaStreamingService {
    fn is_available(&self) -> bool {
        !self.bus.is_closed()
    }

    async fn start_translation(
        &self,
        text: &str,
        model: &str,
        target_language: &str,
    ) -> Result<(), ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::Rejected("source text is empty".to_string()));
        }
        if !self.is_available() {
            return Err(ServiceError::Unavailable);
        }

        let model = match model.trim() {
            "" => DEFAULT_MODEL,
            m => m,
        };
        let target_language = match target_language.trim() {
            "" => DEFAULT_TARGET_LANGUAGE,
            t => t,
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let id = Uuid::new_v4();
        {
            let mut active = self.state.active.lock();
            if active.is_some() {
                return Err(ServiceError::Rejected("translation already running".to_string()));
            }
            *active = Some(ActiveRequest { id, cancel_tx });
        }

        let request = self.build_request(text, model, target_language);
        emit_log(
            &self.bus,
            format!(
                "start: id={} url={} model={} target_language={} prompt_bytes={}",
                id,
                self.base_url,
                model,
                target_language,
                request.prompt().len()
            ),
        );

        let client = self.client.clone();
        let url = format!("{}/api/generate", self.base_url);
        let bus = self.bus.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            let result = stream_generation(&client, &url, &request, &bus, cancel_rx).await;

            // The slot is freed before the terminal event so a restart chained
            // off that event is accepted.
            state.release(id);

            match result {
                Ok(StreamOutcome::Completed { received_any: true }) => {
                    emit_log(&bus, format!("exit: id={} success=true", id));
                    bus.publish(Event::done(true, Some(0)));
                }
                Ok(StreamOutcome::Completed { received_any: false }) => {
                    warn!("Ollama returned no output for request {}", id);
                    bus.publish(Event::error("ollama returned no output"));
                }
                Ok(StreamOutcome::Cancelled) => {
                    emit_log(&bus, format!("exit: id={} success=false cancelled=true", id));
                    bus.publish(Event::done(false, None));
                }
                Err(message) => {
                    error!("Translation request {} failed: {}", id, message);
                    bus.publish(Event::error(message));
                }
            }
        });

        Ok(())
    }

    async fn cancel_translation(&self) -> Result<(), ServiceError> {
        let active = self.state.active.lock();
        match active.as_ref() {
            Some(request) => {
                info!("Cancelling translation {}", request.id);
                let _ = request.cancel_tx.send(true);
            }
            None => debug!("Cancel requested with no translation running"),
        }
        Ok(())
    }

    async fn take_initial_input(&self) -> Result<Option<String>, ServiceError> {
        Ok(self.state.initial_input.lock().take())
    }
}
