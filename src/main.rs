// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{debug, error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ollama_translator::app_config::{Config, LogLevel};
use ollama_translator::events::{Event, EventBus, Topic};
use ollama_translator::preferences::{JsonFilePreferenceStore, Preferences};
use ollama_translator::providers::mock::ScriptedStreamingService;
use ollama_translator::providers::ollama::OllamaStreamingService;
use ollama_translator::providers::StreamingService;
use ollama_translator::session::{Command, ControllerHandle, SessionController, SessionView, Status};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive translation session (default command)
    Run(RunArgs),

    /// Check that the Ollama server is reachable
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: String,
    },

    /// Generate shell completions for ollama-translator
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Text to translate as soon as the session starts
    #[arg(value_name = "TEXT", num_args = 1.., trailing_var_arg = true)]
    text: Vec<String>,

    /// Model name to use for translation (saved as the new preference)
    #[arg(short, long)]
    model: Option<String>,

    /// Target language, e.g. 'Japanese' or 'fr' (saved as the new preference)
    #[arg(short, long)]
    target_language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Preference file path
    #[arg(long)]
    preferences: Option<PathBuf>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Translate the initial text and exit instead of reading stdin
    #[arg(long)]
    once: bool,

    /// Echo input back instead of contacting Ollama
    #[arg(long)]
    dry_run: bool,
}

/// ollama-translator - Interactive streaming translation with Ollama
#[derive(Parser, Debug)]
#[command(name = "ollama-translator")]
#[command(version)]
#[command(about = "Streaming translation session backed by a local Ollama server")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "ollama-translator streams translations from a local Ollama server.

Every line read from stdin is submitted as new input. Input that arrives while
a translation is streaming cancels it and restarts with the new text.

EXAMPLES:
    ollama-translator                               # Interactive session
    ollama-translator --once Hello world            # Translate once and exit
    ollama-translator -t French -m gemma3:4b        # Change and save preferences
    echo 'Good morning' | ollama-translator         # Translate piped text
    ollama-translator check                         # Check the Ollama server
    ollama-translator completions bash > ot.bash    # Generate bash completions

SESSION COMMANDS (stdin):
    :stop            Cancel the running translation
    :model NAME      Use another model for the next request
    :lang LANGUAGE   Use another target language for the next request
    :translate       Translate the current source text again
    :clear           Clear the source text
    :quit            Exit immediately

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one is created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

// @struct: Custom logger implementation, filtered by the global max level
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Renders the session on the terminal: output on stdout, status on stderr
#[derive(Debug, Default)]
struct TerminalView {
    line_open: bool,
}

impl TerminalView {
    fn close_line(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

impl SessionView for TerminalView {
    fn set_status(&mut self, status: &Status) {
        self.close_line();
        match status {
            Status::Error(_) | Status::Unavailable => error!("{}", status),
            Status::Exited { .. } | Status::SourceEmpty => warn!("{}", status),
            _ => info!("{}", status),
        }
    }

    fn append_output(&mut self, chunk: &str) {
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
        self.line_open = !chunk.ends_with('\n');
    }

    fn clear_output(&mut self) {
        self.close_line();
    }

    fn set_source(&mut self, text: &str) {
        debug!("Source: {} chars", text.chars().count());
    }
}

/// What a line typed on stdin asks for
#[derive(Debug, PartialEq)]
enum ConsoleInput {
    Text(String),
    Command(Command),
    Ignored,
}

fn parse_console_line(line: &str) -> ConsoleInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleInput::Ignored;
    }
    let Some(rest) = trimmed.strip_prefix(':') else {
        return ConsoleInput::Text(line.to_string());
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };
    match name {
        "stop" | "cancel" => ConsoleInput::Command(Command::Cancel),
        "model" if !argument.is_empty() => ConsoleInput::Command(Command::SetModel(argument.to_string())),
        "lang" if !argument.is_empty() => {
            ConsoleInput::Command(Command::SetTargetLanguage(argument.to_string()))
        }
        "translate" => ConsoleInput::Command(Command::Translate),
        "clear" => ConsoleInput::Command(Command::ClearSource),
        "quit" | "exit" => ConsoleInput::Command(Command::Shutdown),
        _ => ConsoleInput::Text(line.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "ollama-translator", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Check { config_path }) => run_check(&config_path).await,
        Some(Commands::Run(args)) => run_session(args).await,
        None => run_session(cli.run).await,
    }
}

fn load_config(config_path: &str, log_level: Option<CliLogLevel>) -> Result<Config> {
    // If log level is set via command line, apply it immediately
    if let Some(level) = &log_level {
        let level: LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let mut config = Config::load_or_create(Path::new(config_path))?;

    match log_level {
        Some(level) => config.log_level = level.into(),
        None => log::set_max_level(config.log_level.to_level_filter()),
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_check(config_path: &str) -> Result<()> {
    let config = load_config(config_path, None)?;
    let service = OllamaStreamingService::from_config(&config.backend, EventBus::new());
    let version = service
        .version()
        .await
        .with_context(|| format!("Ollama is not reachable at {}", service.base_url()))?;
    info!("Ollama {} reachable at {}", version, service.base_url());
    Ok(())
}

async fn run_session(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config_path, args.log_level.clone())?;
    if let Some(path) = &args.preferences {
        config.preferences_path = Some(path.clone());
    }

    let preferences_path = config.resolve_preferences_path()?;
    let store = JsonFilePreferenceStore::open(&preferences_path)
        .with_context(|| format!("Failed to open preferences: {}", preferences_path.display()))?;
    let preferences = Preferences::with_config(Arc::new(store), &config);
    if let Some(model) = &args.model {
        preferences.set_model(model);
    }
    if let Some(target_language) = &args.target_language {
        preferences.set_target_language(target_language);
    }

    let bus = EventBus::new();
    let _log_subscription = bus.subscribe(Topic::Log, |event| {
        if let Event::Log(line) = event {
            debug!("backend: {}", line);
        }
    });

    let initial_input = args.text.join(" ");
    let service: Arc<dyn StreamingService> = if args.dry_run {
        info!("Dry run: echoing input instead of contacting Ollama");
        Arc::new(ScriptedStreamingService::echo(bus.clone()).with_initial_input(initial_input))
    } else {
        Arc::new(
            OllamaStreamingService::from_config(&config.backend, bus.clone())
                .with_initial_input(initial_input),
        )
    };

    let mut controller = SessionController::new(service, bus.clone(), preferences, TerminalView::default());
    let handle = controller.handle();
    controller.initialize().await;
    info!(
        "Model: {} | Target language: {}",
        controller.model_field(),
        controller.target_language_field()
    );

    let session = tokio::spawn(controller.run());

    if args.once {
        handle.finish();
    } else {
        let console_bus = bus.clone();
        std::thread::spawn(move || read_console(handle, console_bus));
    }

    let mut view = session.await.context("Session task failed")?;
    view.close_line();
    bus.close();
    Ok(())
}

// Blocking stdin reader, run on its own thread
fn read_console(handle: ControllerHandle, bus: EventBus) {
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) => match parse_console_line(&line) {
                ConsoleInput::Text(text) => {
                    if !handle.push_input(&bus, text) {
                        return;
                    }
                }
                ConsoleInput::Command(command) => {
                    if !handle.send(command) {
                        return;
                    }
                }
                ConsoleInput::Ignored => {}
            },
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
    handle.finish();
}
