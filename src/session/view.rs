use crate::session::status::Status;

/// Output sink driven by the session controller
///
/// Implementations only render; they never call back into the controller.
pub trait SessionView: Send {
    /// Show a new status line
    fn set_status(&mut self, status: &Status);

    /// Append one streamed fragment to the output
    fn append_output(&mut self, chunk: &str);

    /// Reset the output before a fresh request
    fn clear_output(&mut self);

    /// Reflect the editable source text
    fn set_source(&mut self, _text: &str) {}

    /// Enable or disable the start and cancel actions
    fn set_running(&mut self, _running: bool) {}
}

/// In-memory sink that keeps the accumulated output and every status shown
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    output: String,
    source: String,
    statuses: Vec<Status>,
    running: bool,
    clears: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated output of the current request
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Most recent status, if any
    pub fn status(&self) -> Option<&Status> {
        self.statuses.last()
    }

    /// Every status shown so far, oldest first
    pub fn statuses(&self) -> &[Status] {
        &self.statuses
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// How many times the output has been reset
    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl SessionView for OutputBuffer {
    fn set_status(&mut self, status: &Status) {
        self.statuses.push(status.clone());
    }

    fn append_output(&mut self, chunk: &str) {
        self.output.push_str(chunk);
    }

    fn clear_output(&mut self) {
        self.output.clear();
        self.clears += 1;
    }

    fn set_source(&mut self, text: &str) {
        self.source = text.to_string();
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
    }
}
