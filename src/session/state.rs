/*!
 * Session state machine.
 *
 * `transition` is a pure function from the current [`SessionState`] and one
 * [`SessionInput`] to the next state plus the ordered [`Effect`]s the
 * controller must carry out. No I/O happens here.
 *
 * | state   | input             | next    | effects                                                  |
 * |---------|-------------------|---------|----------------------------------------------------------|
 * | Idle    | Submit(text)      | Running | ShowSource, InputReceived, ClearOutput, Streaming, Start |
 * | Running | Submit(text)      | Running | ShowSource, Restarting, Cancel (text kept as pending)    |
 * | any     | Submit(blank)     | same    | none                                                     |
 * | Idle    | Translate         | Running | ClearOutput, Streaming, Start (SourceEmpty if blank)     |
 * | Running | Translate         | Running | none                                                     |
 * | Running | Cancel            | Running | Stopping, Cancel                                         |
 * | Idle    | Cancel            | Idle    | none                                                     |
 * | any     | Done              | Idle    | Completed/Exited, then Submit(pending) if one is queued  |
 * | any     | Error             | Idle    | DropPending, Error                                       |
 * | any     | StartFailed       | Idle    | DropPending, Error                                       |
 * | any     | Unavailable       | Idle    | DropPending, Unavailable                                 |
 */

use crate::events::DonePayload;
use crate::session::status::Status;

/// The single session owned by a controller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Whether a request is in flight
    pub running: bool,
    /// Input to submit once the in-flight request terminates
    pub pending_input: Option<String>,
    /// Editable source text
    pub source: String,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        !self.running
    }
}

/// Everything that can move the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// New text from the user or pushed in from outside
    Submit(String),
    /// Translate the current source text
    Translate,
    /// Stop the in-flight request
    Cancel,
    /// Terminal `done` event
    Done(DonePayload),
    /// Terminal `error` event
    Error(String),
    /// The start call was rejected
    StartFailed(String),
    /// The transport could not be reached at start time
    Unavailable,
    /// Replace the source text without translating
    SetSource(String),
    /// Empty the source text
    ClearSource,
}

/// Side effects requested by a transition, executed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowSource(String),
    Status(Status),
    ClearOutput,
    Start(String),
    Cancel,
    /// A queued restart was discarded
    DropPending(String),
}

/// Result of applying one input
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

/// Compute the next state and effects for `input`
pub fn transition(state: &SessionState, input: SessionInput) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match input {
        SessionInput::Submit(text) => submit(&mut next, &text, &mut effects),
        SessionInput::Translate => {
            if !next.running {
                let text = next.source.trim().to_string();
                if text.is_empty() {
                    effects.push(Effect::Status(Status::SourceEmpty));
                } else {
                    begin(&mut next, text, &mut effects);
                }
            }
        }
        SessionInput::Cancel => {
            if next.running {
                effects.push(Effect::Status(Status::Stopping));
                effects.push(Effect::Cancel);
            }
        }
        SessionInput::Done(payload) => {
            next.running = false;
            effects.push(Effect::Status(Status::from_done(&payload)));
            if let Some(queued) = next.pending_input.take() {
                submit(&mut next, &queued, &mut effects);
            }
        }
        SessionInput::Error(message) | SessionInput::StartFailed(message) => {
            halt(&mut next, &mut effects);
            effects.push(Effect::Status(Status::Error(message)));
        }
        SessionInput::Unavailable => {
            halt(&mut next, &mut effects);
            effects.push(Effect::Status(Status::Unavailable));
        }
        SessionInput::SetSource(text) => next.source = text,
        SessionInput::ClearSource => {
            next.source.clear();
            effects.push(Effect::Status(Status::Cleared));
        }
    }

    Transition {
        state: next,
        effects,
    }
}

fn submit(state: &mut SessionState, text: &str, effects: &mut Vec<Effect>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }

    state.source = trimmed.to_string();
    effects.push(Effect::ShowSource(trimmed.to_string()));

    if state.running {
        state.pending_input = Some(trimmed.to_string());
        effects.push(Effect::Status(Status::Restarting));
        effects.push(Effect::Cancel);
        return;
    }

    effects.push(Effect::Status(Status::InputReceived));
    begin(state, trimmed.to_string(), effects);
}

// Only reachable from idle, so the output always belongs to a finished request.
fn begin(state: &mut SessionState, text: String, effects: &mut Vec<Effect>) {
    effects.push(Effect::ClearOutput);
    state.running = true;
    effects.push(Effect::Status(Status::Streaming));
    effects.push(Effect::Start(text));
}

fn halt(state: &mut SessionState, effects: &mut Vec<Effect>) {
    state.running = false;
    if let Some(dropped) = state.pending_input.take() {
        effects.push(Effect::DropPending(dropped));
    }
}
