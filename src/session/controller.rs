/*!
 * Session controller.
 *
 * The controller is the only issuer of start and cancel calls. It owns the
 * [`SessionState`], feeds every input through [`transition`], and executes the
 * resulting effects against the backend, the preferences and the view.
 *
 * All traffic reaches the controller through one inbox: commands from the
 * front-end and events forwarded by the current subscription group. A single
 * task drains the inbox, so state is never mutated concurrently.
 */

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::ServiceError;
use crate::events::{Delivery, Event, EventBus, SubscriptionGroup};
use crate::preferences::Preferences;
use crate::providers::StreamingService;
use crate::session::state::{transition, Effect, SessionInput, SessionState};
use crate::session::status::Status;
use crate::session::view::SessionView;

/// Requests a front-end can send to a running controller
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Same path as text pushed in from outside
    Submit(String),
    /// Translate the current source text
    Translate,
    Cancel,
    SetSource(String),
    ClearSource,
    SetModel(String),
    SetTargetLanguage(String),
    /// Stop the run loop once the session is idle with nothing queued
    Finish,
    /// Stop the run loop now, cancelling any request in flight
    Shutdown,
}

#[derive(Debug)]
enum Message {
    Command(Command),
    Delivery(Delivery),
}

/// Cloneable sender for [`Command`]s
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl ControllerHandle {
    /// Queue `command`; false if the controller has stopped
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(Message::Command(command)).is_ok()
    }

    pub fn submit(&self, text: impl Into<String>) -> bool {
        self.send(Command::Submit(text.into()))
    }

    /// Hand externally produced text to the session
    ///
    /// Published as an input event; if no subscription group is listening,
    /// as happens briefly while groups are swapped, it is submitted directly.
    /// Returns false if the controller has stopped.
    pub fn push_input(&self, bus: &EventBus, text: impl Into<String>) -> bool {
        let mut accepted = true;
        bus.publish_or_else(Event::Input(text.into()), |event| {
            if let Event::Input(text) = event {
                accepted = self.submit(text);
            }
        });
        accepted
    }

    pub fn translate(&self) -> bool {
        self.send(Command::Translate)
    }

    pub fn cancel(&self) -> bool {
        self.send(Command::Cancel)
    }

    pub fn set_model(&self, model: impl Into<String>) -> bool {
        self.send(Command::SetModel(model.into()))
    }

    pub fn set_target_language(&self, target_language: impl Into<String>) -> bool {
        self.send(Command::SetTargetLanguage(target_language.into()))
    }

    pub fn finish(&self) -> bool {
        self.send(Command::Finish)
    }

    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }
}

/// Drives one translation session against a streaming backend
pub struct SessionController<V: SessionView> {
    // @field: Session state, mutated only through `transition`
    state: SessionState,
    service: Arc<dyn StreamingService>,
    bus: EventBus,
    preferences: Preferences,
    // @field: Editable model field, may be blank
    model_field: String,
    // @field: Editable target language field, may be blank
    target_language_field: String,
    view: V,
    subscriptions: Option<SubscriptionGroup>,
    generation: u64,
    inbox_tx: mpsc::UnboundedSender<Message>,
    inbox_rx: mpsc::UnboundedReceiver<Message>,
    initialized: bool,
    finish_when_idle: bool,
}

impl<V: SessionView> std::fmt::Debug for SessionController<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("model_field", &self.model_field)
            .field("target_language_field", &self.target_language_field)
            .finish()
    }
}

impl<V: SessionView> SessionController<V> {
    /// Create an idle controller; call [`initialize`](Self::initialize) or [`run`](Self::run) next
    pub fn new(
        service: Arc<dyn StreamingService>,
        bus: EventBus,
        preferences: Preferences,
        view: V,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            state: SessionState::default(),
            service,
            bus,
            preferences,
            model_field: String::new(),
            target_language_field: String::new(),
            view,
            subscriptions: None,
            generation: 0,
            inbox_tx,
            inbox_rx,
            initialized: false,
            finish_when_idle: false,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.inbox_tx.clone(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn pending_input(&self) -> Option<&str> {
        self.state.pending_input.as_deref()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn model_field(&self) -> &str {
        &self.model_field
    }

    pub fn target_language_field(&self) -> &str {
        &self.target_language_field
    }

    /// Generation of the live subscription group, if one is installed
    pub fn subscription_generation(&self) -> Option<u64> {
        self.subscriptions
            .as_ref()
            .filter(|group| group.is_active())
            .map(SubscriptionGroup::generation)
    }

    /// Load fields from preferences, start listening, and consume the initial input
    ///
    /// Runs once; later calls do nothing.
    pub async fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;

        self.model_field = self.preferences.model();
        self.target_language_field = self.preferences.target_language();
        self.view.set_running(false);
        self.show_status(Status::Ready);
        self.resubscribe();

        match self.service.take_initial_input().await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                debug!("Submitting initial input ({} bytes)", text.len());
                self.apply(SessionInput::Submit(text)).await;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to take initial input: {}", e);
                self.show_status(Status::Error(e.to_string()));
            }
        }
    }

    /// Submit text typed by the user or pushed in from outside
    pub async fn submit(&mut self, text: impl Into<String>) {
        self.apply(SessionInput::Submit(text.into())).await;
    }

    /// Translate whatever is currently in the source field
    pub async fn translate(&mut self) {
        self.apply(SessionInput::Translate).await;
    }

    /// Ask the backend to stop the in-flight request
    pub async fn cancel(&mut self) {
        self.apply(SessionInput::Cancel).await;
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model_field = model.into();
    }

    pub fn set_target_language(&mut self, target_language: impl Into<String>) {
        self.target_language_field = target_language.into();
    }

    /// Process every queued message without waiting for more
    ///
    /// Returns the number of messages handled.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            handled += 1;
            if !self.dispatch(message).await {
                break;
            }
        }
        handled
    }

    /// Serve commands and events until shut down, then return the view
    pub async fn run(mut self) -> V {
        self.initialize().await;

        while let Some(message) = self.inbox_rx.recv().await {
            if !self.dispatch(message).await {
                break;
            }
        }

        self.shutdown().await;
        self.view
    }

    /// Cancel anything in flight and release all subscriptions
    pub async fn shutdown(&mut self) {
        if self.state.running {
            if let Err(e) = self.service.cancel_translation().await {
                warn!("Failed to cancel translation on shutdown: {}", e);
            }
        }
        if let Some(mut group) = self.subscriptions.take() {
            group.teardown();
        }
        debug!("Session controller shut down");
    }

    // @returns: false when the run loop should stop
    async fn dispatch(&mut self, message: Message) -> bool {
        match message {
            Message::Delivery(delivery) => {
                if let Some(input) = self.on_delivery(delivery) {
                    self.apply(input).await;
                }
            }
            Message::Command(command) => match command {
                Command::Submit(text) => self.apply(SessionInput::Submit(text)).await,
                Command::Translate => self.apply(SessionInput::Translate).await,
                Command::Cancel => self.apply(SessionInput::Cancel).await,
                Command::SetSource(text) => self.apply(SessionInput::SetSource(text)).await,
                Command::ClearSource => self.apply(SessionInput::ClearSource).await,
                Command::SetModel(model) => self.set_model(model),
                Command::SetTargetLanguage(language) => self.set_target_language(language),
                Command::Finish => self.finish_when_idle = true,
                Command::Shutdown => return false,
            },
        }

        !(self.finish_when_idle && self.state.is_idle())
    }

    fn on_delivery(&mut self, delivery: Delivery) -> Option<SessionInput> {
        let Delivery { generation, event } = delivery;
        match event {
            Event::Input(text) => Some(SessionInput::Submit(text)),
            event if generation != self.generation => {
                debug!(
                    "Ignoring {} from retired subscription group {} (current {})",
                    event.topic(),
                    generation,
                    self.generation
                );
                None
            }
            Event::Chunk(text) => {
                self.view.append_output(&text);
                None
            }
            Event::Done(payload) => Some(SessionInput::Done(payload)),
            Event::Error(payload) => Some(SessionInput::Error(payload.message)),
            Event::Log(_) => None,
        }
    }

    /// Run `input` and any inputs its effects feed back through the state machine
    async fn apply(&mut self, input: SessionInput) {
        let mut queue = VecDeque::from([input]);

        while let Some(input) = queue.pop_front() {
            let outcome = transition(&self.state, input);
            let was_running = self.state.running;
            self.state = outcome.state;
            if was_running != self.state.running {
                self.view.set_running(self.state.running);
            }

            for effect in outcome.effects {
                if let Some(feedback) = self.execute(effect).await {
                    queue.push_back(feedback);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<SessionInput> {
        match effect {
            Effect::ShowSource(text) => {
                self.view.set_source(&text);
                None
            }
            Effect::Status(status) => {
                self.show_status(status);
                None
            }
            Effect::ClearOutput => {
                self.view.clear_output();
                None
            }
            Effect::Start(text) => self.start(text).await,
            Effect::Cancel => {
                if let Err(e) = self.service.cancel_translation().await {
                    error!("Cancel request failed: {}", e);
                    self.show_status(Status::Error(e.to_string()));
                }
                None
            }
            Effect::DropPending(text) => {
                warn!("Discarding queued input after failure ({} bytes)", text.len());
                None
            }
        }
    }

    async fn start(&mut self, text: String) -> Option<SessionInput> {
        if !self.service.is_available() {
            warn!("Streaming backend unavailable, not starting");
            return Some(SessionInput::Unavailable);
        }

        let model = resolve(&self.model_field, || self.preferences.model());
        let target_language = resolve(&self.target_language_field, || {
            self.preferences.target_language()
        });
        self.preferences.set_model(&model);
        self.preferences.set_target_language(&target_language);

        self.resubscribe();

        info!(
            "Translating {} chars with {} into {}",
            text.chars().count(),
            model,
            target_language
        );

        match self
            .service
            .start_translation(&text, &model, &target_language)
            .await
        {
            Ok(()) => None,
            Err(ServiceError::Unavailable) => Some(SessionInput::Unavailable),
            Err(e) => {
                error!("Failed to start translation: {}", e);
                Some(SessionInput::StartFailed(e.to_string()))
            }
        }
    }

    /// Retire the current subscription group, then install a fresh one
    fn resubscribe(&mut self) {
        if let Some(mut group) = self.subscriptions.take() {
            group.teardown();
        }

        self.generation += 1;
        let tx = self.inbox_tx.clone();
        self.subscriptions = Some(SubscriptionGroup::establish(
            &self.bus,
            self.generation,
            move |delivery| {
                let _ = tx.send(Message::Delivery(delivery));
            },
        ));
        debug!("Installed subscription group {}", self.generation);
    }

    fn show_status(&mut self, status: Status) {
        if status.is_error() {
            warn!("{}", status);
        } else {
            debug!("{}", status);
        }
        self.view.set_status(&status);
    }
}

fn resolve(field: &str, fallback: impl FnOnce() -> String) -> String {
    match field.trim() {
        "" => fallback(),
        value => value.to_string(),
    }
}
