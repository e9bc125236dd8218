/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;
use std::process::Command;
use std::sync::Arc;

use ollama_translator::app_config::Config;
use ollama_translator::events::EventBus;
use ollama_translator::preferences::{JsonFilePreferenceStore, Preferences, MODEL_KEY};
use ollama_translator::providers::mock::ScriptedStreamingService;
use ollama_translator::session::{OutputBuffer, SessionController, Status};
use crate::common;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ollama-translator"))
}

/// Config, preference file and session wired together as the binary does
#[test]
fn test_session_lifecycle_withConfigAndPreferenceFile_shouldPersistChoices() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config_path = temp_dir.path().join("conf.json");
    let mut config = Config::load_or_create(&config_path)?;
    config.preferences_path = Some(temp_dir.path().join("prefs").join("preferences.json"));
    config.validate()?;

    let preferences_path = config.resolve_preferences_path()?;
    let store = JsonFilePreferenceStore::open(&preferences_path)?;
    let preferences = Preferences::with_config(Arc::new(store), &config);
    preferences.set_model("gemma3:4b");

    let bus = EventBus::new();
    let service = Arc::new(ScriptedStreamingService::echo(bus.clone()).with_initial_input("Good night"));
    let controller = SessionController::new(service.clone(), bus.clone(), preferences, OutputBuffer::new());
    controller.handle().finish();

    let view = tokio_test::block_on(controller.run());
    bus.close();

    assert_eq!(view.output(), "Good night");
    assert_eq!(view.status(), Some(&Status::Completed { code: Some(0) }));
    assert_eq!(service.start_calls()[0].model, "gemma3:4b");

    let saved = std::fs::read_to_string(&preferences_path)?;
    let saved: serde_json::Value = serde_json::from_str(&saved)?;
    assert_eq!(saved[MODEL_KEY], "gemma3:4b");
    Ok(())
}

/// Dry run translates the command line text and exits
#[test]
fn test_binary_withDryRunOnce_shouldEchoText() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config_path = temp_dir.path().join("conf.json");
    let preferences_path = temp_dir.path().join("preferences.json");

    let output = binary()
        .arg("--dry-run")
        .arg("--once")
        .arg("--config-path")
        .arg(&config_path)
        .arg("--preferences")
        .arg(&preferences_path)
        .arg("--target-language")
        .arg("French")
        .arg("Hello")
        .arg("world")
        .output()?;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Hello world"));
    assert!(config_path.exists());

    let saved = std::fs::read_to_string(&preferences_path)?;
    assert!(saved.contains("French"));
    Ok(())
}

/// Completions are generated for the binary name
#[test]
fn test_binary_withCompletions_shouldPrintScript() -> Result<()> {
    let output = binary().arg("completions").arg("bash").output()?;

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ollama-translator"));
    Ok(())
}

/// An invalid configuration file stops the binary with an error
#[test]
fn test_binary_withInvalidConfig_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config_path = temp_dir.path().join("conf.json");
    std::fs::write(&config_path, r#"{ "backend": { "endpoint": "ftp://nowhere" } }"#)?;

    let output = binary()
        .arg("--dry-run")
        .arg("--once")
        .arg("--config-path")
        .arg(&config_path)
        .arg("--preferences")
        .arg(temp_dir.path().join("preferences.json"))
        .output()?;

    assert!(!output.status.success());
    Ok(())
}
