/*!
 * Tests for the streaming backends
 */

use parking_lot::Mutex;
use std::sync::Arc;

use ollama_translator::app_config::BackendConfig;
use ollama_translator::errors::ServiceError;
use ollama_translator::events::{Event, EventBus, Topic};
use ollama_translator::providers::mock::{MockBehavior, ScriptedStreamingService};
use ollama_translator::providers::ollama::{GenerationRequest, OllamaStreamingService};
use ollama_translator::providers::StreamingService;

fn record(bus: &EventBus, topic: Topic) -> (Arc<Mutex<Vec<Event>>>, ollama_translator::events::Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = bus.subscribe(topic, move |event| sink.lock().push(event));
    (seen, subscription)
}

/// Echo mode streams the words back followed by a successful done
#[tokio::test]
async fn test_echo_backend_withText_shouldStreamWordsAndDone() {
    let bus = EventBus::new();
    let service = ScriptedStreamingService::echo(bus.clone());
    let (chunks, _chunk_sub) = record(&bus, Topic::Chunk);
    let (dones, _done_sub) = record(&bus, Topic::Done);

    service.start_translation("Hello big world", "m", "French").await.unwrap();

    assert_eq!(
        *chunks.lock(),
        vec![
            Event::Chunk("Hello ".into()),
            Event::Chunk("big ".into()),
            Event::Chunk("world".into()),
        ]
    );
    assert_eq!(*dones.lock(), vec![Event::done(true, Some(0))]);
}

/// Scripted batches take precedence and are consumed in order
#[tokio::test]
async fn test_silent_backend_withScript_shouldPublishBatchesInOrder() {
    let bus = EventBus::new();
    let service = ScriptedStreamingService::silent(bus.clone());
    service.script_next_start(vec![Event::Chunk("one".into())]);
    service.script_next_start(vec![Event::error("two")]);
    let (chunks, _chunk_sub) = record(&bus, Topic::Chunk);
    let (errors, _error_sub) = record(&bus, Topic::Error);

    service.start_translation("a", "m", "t").await.unwrap();
    service.start_translation("b", "m", "t").await.unwrap();
    service.start_translation("c", "m", "t").await.unwrap();

    assert_eq!(chunks.lock().len(), 1);
    assert_eq!(*errors.lock(), vec![Event::error("two")]);
    assert_eq!(service.start_count(), 3);
}

/// Rejecting and unavailable modes fail the start call
#[tokio::test]
async fn test_failing_backends_onStart_shouldReturnErrors() {
    let bus = EventBus::new();

    let rejecting = ScriptedStreamingService::rejecting(bus.clone(), "busy");
    match rejecting.start_translation("x", "m", "t").await {
        Err(ServiceError::Rejected(message)) => assert_eq!(message, "busy"),
        other => panic!("unexpected result: {:?}", other),
    }

    let unavailable = ScriptedStreamingService::new(bus, MockBehavior::Unavailable);
    assert!(!unavailable.is_available());
    assert!(matches!(
        unavailable.start_translation("x", "m", "t").await,
        Err(ServiceError::Unavailable)
    ));
}

/// Initial input is handed out only once
#[tokio::test]
async fn test_take_initial_input_calledTwice_shouldReturnOnce() {
    let service = ScriptedStreamingService::silent(EventBus::new()).with_initial_input("hi");

    assert_eq!(service.take_initial_input().await.unwrap().as_deref(), Some("hi"));
    assert_eq!(service.take_initial_input().await.unwrap(), None);
}

/// Request builder output matches the Ollama generate API
#[test]
fn test_generation_request_withOptions_shouldSerializeForOllama() {
    let request = GenerationRequest::new("translategemma:4b", "prompt text")
        .temperature(0.3)
        .keep_alive("10m");
    let json = serde_json::to_value(&request).unwrap();

    assert_eq!(json["model"], "translategemma:4b");
    assert_eq!(json["prompt"], "prompt text");
    assert_eq!(json["stream"], true);
    assert_eq!(json["keep_alive"], "10m");
    assert!((json["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    assert_eq!(request.model(), "translategemma:4b");
}

/// Configuration is carried over to the service
#[test]
fn test_ollama_from_config_withTrailingSlash_shouldNormalizeUrl() {
    let config = BackendConfig {
        endpoint: "http://127.0.0.1:11434/".to_string(),
        ..BackendConfig::default()
    };
    let service = OllamaStreamingService::from_config(&config, EventBus::new());

    assert_eq!(service.base_url(), "http://127.0.0.1:11434");
    assert!(!service.is_running());
    assert!(service.is_available());
}

/// Blank source text is rejected before any request is made
#[tokio::test]
async fn test_ollama_start_withBlankText_shouldReject() {
    let service = OllamaStreamingService::new("http://127.0.0.1:9", EventBus::new());

    let result = service.start_translation("  ", "m", "French").await;

    assert!(matches!(result, Err(ServiceError::Rejected(_))));
    assert!(!service.is_running());
}

/// A closed bus makes the backend unavailable
#[tokio::test]
async fn test_ollama_start_withClosedBus_shouldBeUnavailable() {
    let bus = EventBus::new();
    let service = OllamaStreamingService::new("http://127.0.0.1:9", bus.clone());
    bus.close();

    assert!(!service.is_available());
    assert!(matches!(
        service.start_translation("Hello", "m", "French").await,
        Err(ServiceError::Unavailable)
    ));
}

/// Cancel with nothing running succeeds quietly
#[tokio::test]
async fn test_ollama_cancel_withNothingRunning_shouldSucceed() {
    let service = OllamaStreamingService::new("http://127.0.0.1:9", EventBus::new());

    assert!(service.cancel_translation().await.is_ok());
}

/// Blank initial input is not queued
#[tokio::test]
async fn test_ollama_with_initial_input_withBlank_shouldQueueNothing() {
    let service =
        OllamaStreamingService::new("http://127.0.0.1:9", EventBus::new()).with_initial_input(" ");

    assert_eq!(service.take_initial_input().await.unwrap(), None);
}
