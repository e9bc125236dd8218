/*!
 * # ollama-translator - Interactive streaming translation with Ollama
 *
 * A Rust library for driving a single streaming translation session against
 * a local LLM backend.
 *
 * ## Features
 *
 * - Stream translations from Ollama and render them as they arrive
 * - Cancel an in-flight request at any time
 * - New input while a request runs cancels it and restarts with the new text
 * - Text can be pushed in from outside the session (other processes, scripts)
 * - Model and target language preferences persisted between runs
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `preferences`: Persisted model and target language preferences
 * - `events`: Publish/subscribe channel between the controller and the backend
 * - `providers`: Streaming backends:
 *   - `providers::ollama`: Ollama HTTP streaming backend
 *   - `providers::mock`: Scripted backend for tests and dry runs
 * - `session`: The session state machine and its controller
 * - `prompt`: Translation prompt construction
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod errors;
pub mod events;
pub mod language_utils;
pub mod preferences;
pub mod prompt;
pub mod providers;
pub mod session;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{PreferenceError, ServiceError};
pub use events::{Event, EventBus, Topic};
pub use preferences::Preferences;
pub use providers::StreamingService;
pub use session::{OutputBuffer, SessionController, SessionView, Status};
