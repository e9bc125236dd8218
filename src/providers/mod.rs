/*!
 * Streaming backend implementations.
 *
 * This module contains the backends a session can drive:
 * - Ollama: local LLM server streamed over HTTP
 * - Mock: scripted backend that records calls, for tests and dry runs
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ServiceError;

/// Common trait for all streaming translation backends
///
/// Calls only start or stop work. Results are published on the event bus the
/// backend was built with: chunk events, then exactly one terminal `done` or
/// `error` event per started request.
#[async_trait]
pub trait StreamingService: Send + Sync + Debug {
    /// Whether the call surface can be reached right now
    ///
    /// Checked synchronously before every start.
    fn is_available(&self) -> bool;

    /// Begin streaming a translation of `text`
    ///
    /// # Returns
    /// * `Ok(())` once the request is accepted; output arrives as events
    /// * `Err(ServiceError)` if the request was rejected
    async fn start_translation(
        &self,
        text: &str,
        model: &str,
        target_language: &str,
    ) -> Result<(), ServiceError>;

    /// Ask the in-flight request to stop; a no-op when nothing is running
    async fn cancel_translation(&self) -> Result<(), ServiceError>;

    /// One-shot retrieval of text queued before the session was ready
    async fn take_initial_input(&self) -> Result<Option<String>, ServiceError>;
}

pub mod mock;
pub mod ollama;
