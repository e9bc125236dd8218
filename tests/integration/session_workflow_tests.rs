/*!
 * End-to-end translation scenarios driven through the controller
 */

use std::sync::Arc;
use std::time::Duration;

use ollama_translator::events::{Event, EventBus};
use ollama_translator::preferences::Preferences;
use ollama_translator::providers::mock::StartCall;
use ollama_translator::providers::ollama::OllamaStreamingService;
use ollama_translator::session::{OutputBuffer, SessionController, Status};
use crate::common;
use crate::common::stub_server::{spawn_stub, StubReply};

/// "Hello" becomes "Bonjour" with the saved French preference
#[tokio::test]
async fn test_translation_withFrenchPreference_shouldStreamBonjour() {
    common::init_test_logging();
    let mut session = common::silent_session();
    Preferences::new(session.store.clone()).set_target_language("French");
    session.service.script_next_start(vec![
        Event::Chunk("Bon".to_string()),
        Event::Chunk("jour".to_string()),
        Event::done(true, Some(0)),
    ]);

    session.controller.initialize().await;
    session.controller.submit("Hello").await;
    session.controller.drain().await;

    assert_eq!(session.output(), "Bonjour");
    assert_eq!(session.status_text(), "Completed (code: 0).");
    assert_eq!(session.service.start_calls()[0].target_language, "French");
    assert_eq!(
        session.controller.view().statuses(),
        &[
            Status::Ready,
            Status::InputReceived,
            Status::Streaming,
            Status::Completed { code: Some(0) },
        ]
    );
}

/// Input arriving mid-stream cancels the first request and restarts with the new text
#[tokio::test]
async fn test_restart_withInputDuringStream_shouldTranslateLatestInput() {
    common::init_test_logging();
    let mut session = common::silent_session();
    session.service.script_next_start(vec![Event::Chunk("prem".to_string())]);
    session.service.on_cancel(vec![Event::done(false, Some(1))]);
    session.service.script_next_start(vec![
        Event::Chunk("deux".to_string()),
        Event::done(true, Some(0)),
    ]);

    session.controller.initialize().await;
    session.controller.submit("first").await;
    session.controller.drain().await;
    assert_eq!(session.output(), "prem");

    session.controller.submit("second").await;
    session.controller.drain().await;

    let calls = session.service.start_calls();
    assert_eq!(
        calls.iter().map(|call| call.text.as_str()).collect::<Vec<_>>(),
        vec!["first", "second"]
    );
    assert_eq!(session.service.cancel_count(), 1);
    assert_eq!(session.output(), "deux");

    let statuses = session.controller.view().statuses();
    let exited = statuses
        .iter()
        .position(|status| *status == Status::Exited { code: Some(1) })
        .expect("first request reported as exited");
    let restarting = statuses
        .iter()
        .position(|status| *status == Status::Restarting)
        .expect("restart announced");
    assert!(restarting < exited);
    assert_eq!(statuses.last(), Some(&Status::Completed { code: Some(0) }));
}

/// External input is translated through the running loop
#[tokio::test]
async fn test_run_loop_withExternalInput_shouldTranslateEachInput() {
    let session = common::echo_session();
    let bus = session.bus.clone();
    let handle = session.controller.handle();
    let service = session.service.clone();

    let task = tokio::spawn(session.controller.run());
    tokio::task::yield_now().await;
    // Wait for the session to start listening
    for _ in 0..100 {
        if bus.subscriber_count(ollama_translator::events::Topic::Input) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    bus.publish(Event::Input("external text".to_string()));
    handle.finish();
    let view = task.await.expect("session task");

    assert_eq!(view.output(), "external text");
    assert_eq!(
        service.start_calls(),
        vec![StartCall {
            text: "external text".to_string(),
            model: "translategemma:4b".to_string(),
            target_language: "Japanese".to_string(),
        }]
    );
}

/// The real backend drives the controller against a stub Ollama server
#[tokio::test]
async fn test_ollama_session_withStubServer_shouldStreamIntoView() {
    common::init_test_logging();
    let (url, _bodies) = spawn_stub(StubReply::ok(vec![
        r#"{"response":"Bon","done":false}"#,
        r#"{"response":"jour","done":false}"#,
        r#"{"response":"","done":true}"#,
    ]))
    .await;
    let bus = EventBus::new();
    let service = Arc::new(OllamaStreamingService::new(url, bus.clone()).with_initial_input("Hello"));
    let controller = SessionController::new(
        service,
        bus.clone(),
        Preferences::in_memory(),
        OutputBuffer::new(),
    );
    let handle = controller.handle();

    handle.finish();
    let view = tokio::time::timeout(Duration::from_secs(5), controller.run())
        .await
        .expect("session finishes");

    assert_eq!(view.output(), "Bonjour");
    assert_eq!(view.status(), Some(&Status::Completed { code: Some(0) }));
    assert!(!view.running());
}

/// Backend failures leave the session idle and usable
#[tokio::test]
async fn test_session_afterError_shouldAcceptNewInput() {
    let mut session = common::silent_session();
    session.service.script_next_start(vec![Event::error("model not found")]);
    session.service.script_next_start(vec![
        Event::Chunk("ok".to_string()),
        Event::done(true, Some(0)),
    ]);

    session.controller.initialize().await;
    session.controller.submit("one").await;
    session.controller.drain().await;
    assert_eq!(session.status_text(), "Error: model not found");
    assert!(!session.controller.is_running());

    session.controller.submit("two").await;
    session.controller.drain().await;
    assert_eq!(session.output(), "ok");
    assert_eq!(session.status_text(), "Completed (code: 0).");
}
