/*!
 * Interactive translation session.
 *
 * This module provides:
 * - `state`: the pure session state machine
 * - `status`: status messages shown to the user
 * - `view`: the output sink the controller renders into
 * - `controller`: the single authority that drives the backend
 */

pub mod controller;
pub mod state;
pub mod status;
pub mod view;

// Re-export main types
pub use controller::{Command, ControllerHandle, SessionController};
pub use state::{transition, Effect, SessionInput, SessionState, Transition};
pub use status::Status;
pub use view::{OutputBuffer, SessionView};
