/*!
 * Scripted streaming backend.
 *
 * `ScriptedStreamingService` records every call it receives and publishes
 * predetermined events on its bus instead of contacting a server:
 * - `ScriptedStreamingService::silent()` - Accepts requests, publishes nothing unless scripted
 * - `ScriptedStreamingService::echo()` - Streams the source text back word by word
 * - `ScriptedStreamingService::rejecting()` - Rejects every start call
 * - `ScriptedStreamingService::unavailable()` - Reports the transport as unreachable
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::errors::ServiceError;
use crate::events::{Event, EventBus};
use crate::providers::StreamingService;

/// Arguments of one recorded start call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCall {
    pub text: String,
    pub model: String,
    pub target_language: String,
}

/// Behavior mode for the scripted backend
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Accepts starts and publishes only scripted events
    Silent,
    /// Publishes the source text as word chunks followed by a successful done
    Echo,
    /// Rejects every start with the given message
    Rejecting(String),
    /// Reports the transport as unavailable
    Unavailable,
}

#[derive(Debug, Default)]
struct CallLog {
    starts: Vec<StartCall>,
    cancels: usize,
}

/// Streaming backend double that records calls
#[derive(Debug)]
pub struct ScriptedStreamingService {
    bus: EventBus,
    behavior: MockBehavior,
    calls: Mutex<CallLog>,
    /// Event batches published on successive start calls
    script: Mutex<VecDeque<Vec<Event>>>,
    /// Events published whenever cancel is called
    on_cancel: Mutex<Vec<Event>>,
    initial_input: Mutex<Option<String>>,
}

impl ScriptedStreamingService {
    /// Create a scripted backend with the specified behavior
    pub fn new(bus: EventBus, behavior: MockBehavior) -> Self {
        Self {
            bus,
            behavior,
            calls: Mutex::new(CallLog::default()),
            script: Mutex::new(VecDeque::new()),
            on_cancel: Mutex::new(Vec::new()),
            initial_input: Mutex::new(None),
        }
    }

    pub fn silent(bus: EventBus) -> Self {
        Self::new(bus, MockBehavior::Silent)
    }

    pub fn echo(bus: EventBus) -> Self {
        Self::new(bus, MockBehavior::Echo)
    }

    pub fn rejecting(bus: EventBus, message: impl Into<String>) -> Self {
        Self::new(bus, MockBehavior::Rejecting(message.into()))
    }

    pub fn unavailable(bus: EventBus) -> Self {
        Self::new(bus, MockBehavior::Unavailable)
    }

    /// Queue text to be returned by `take_initial_input`
    pub fn with_initial_input(self, input: impl Into<String>) -> Self {
        *self.initial_input.lock() = Some(input.into());
        self
    }

    /// Publish `events` when the next unscripted start call arrives
    pub fn script_next_start(&self, events: Vec<Event>) {
        self.script.lock().push_back(events);
    }

    /// Publish `events` every time cancel is called
    pub fn on_cancel(&self, events: Vec<Event>) {
        *self.on_cancel.lock() = events;
    }

    /// All start calls received so far, in order
    pub fn start_calls(&self) -> Vec<StartCall> {
        self.calls.lock().starts.clone()
    }

    pub fn start_count(&self) -> usize {
        self.calls.lock().starts.len()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls.lock().cancels
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            self.bus.publish(event);
        }
    }
}

#[async_trait]
impl StreamingService for ScriptedStreamingService {
    fn is_available(&self) -> bool {
        self.behavior != MockBehavior::Unavailable
    }

    async fn start_translation(
        &self,
        text: &str,
        model: &str,
        target_language: &str,
    ) -> Result<(), ServiceError> {
        self.calls.lock().starts.push(StartCall {
            text: text.to_string(),
            model: model.to_string(),
            target_language: target_language.to_string(),
        });

        match &self.behavior {
            MockBehavior::Unavailable => return Err(ServiceError::Unavailable),
            MockBehavior::Rejecting(message) => {
                return Err(ServiceError::Rejected(message.clone()));
            }
            MockBehavior::Silent | MockBehavior::Echo => {}
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(events) => self.publish_all(events),
            None if self.behavior == MockBehavior::Echo => {
                let mut events: Vec<Event> = text
                    .split_inclusive(' ')
                    .map(|word| Event::Chunk(word.to_string()))
                    .collect();
                events.push(Event::done(true, Some(0)));
                self.publish_all(events);
            }
            None => {}
        }

        Ok(())
    }

    async fn cancel_translation(&self) -> Result<(), ServiceError> {
        self.calls.lock().cancels += 1;
        let events = self.on_cancel.lock().clone();
        self.publish_all(events);
        Ok(())
    }

    async fn take_initial_input(&self) -> Result<Option<String>, ServiceError> {
        Ok(self.initial_input.lock().take())
    }
}
