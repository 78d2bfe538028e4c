//! Habla CLI
//!
//! Serves vocabulary lists and sentence validation over HTTP, and plays the
//! sentence game in the terminal against a running server.

mod terminal;

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use habla_api::{create_router, AppState, Config, ContextGenerator, GeminiClient, VocabularyStore, API_KEY_ENV};
use habla_game::{
    ApiClient, CommandSynthesizer, Phase, RecognitionEvent, SentenceGameController, SilentOutput,
    SpeechCapture, SpeechOutput, UnavailableCapture,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::terminal::{
    parse_command, render_prompt, render_result, render_summary, render_transcript, Command, HELP,
};

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Habla - Spanish vocabulary and sentence practice
///
/// Serves vocabulary lists and validates learner sentences with a
/// generative language model.
#[derive(Parser, Debug)]
#[command(name = "habla")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: habla.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Directory holding the vocabulary .yaml files
        #[arg(long, value_name = "DIR")]
        vocabulary_dir: Option<String>,
    },

    /// List the vocabulary lists of a running server
    Lists {
        /// Base URL of the Habla server
        #[arg(short, long, value_name = "URL")]
        server: Option<String>,
    },

    /// Play the sentence game for one vocabulary list
    Play {
        /// Id of the vocabulary list
        #[arg(value_name = "ID")]
        id: String,

        /// Base URL of the Habla server
        #[arg(short, long, value_name = "URL")]
        server: Option<String>,

        /// Do not read follow-up questions aloud
        #[arg(long)]
        no_speech: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    // a missing .env file is fine
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let result = match args.command {
        Commands::Serve {
            port,
            vocabulary_dir,
        } => run_server(args.config.as_deref(), port, vocabulary_dir).await,
        Commands::Lists { server } => run_lists(args.config.as_deref(), server).await,
        Commands::Play {
            id,
            server,
            no_speech,
        } => run_game(args.config.as_deref(), &id, server, no_speech).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Applies a `--server` override and re-validates.
fn client_config(config_path: Option<&str>, server: Option<String>) -> anyhow::Result<Config> {
    let mut config = load_config(config_path)?;
    if let Some(server) = server {
        config.server_url = server;
    }
    config.validate()?;
    Ok(config)
}

// ============================================================================
// serve
// ============================================================================

async fn run_server(
    config_path: Option<&str>,
    port: u16,
    vocabulary_dir: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = vocabulary_dir {
        config.vocabulary_dir = dir;
    }
    config.validate()?;

    print_config(&config);

    tracing::info!(dir = %config.vocabulary_dir, "Loading vocabulary");
    let vocabulary = VocabularyStore::load_dir_or_empty(&config.vocabulary_dir);
    println!("  Vocabulary lists: {}", vocabulary.len());

    let client = GeminiClient::from_env(&config)?;
    if !client.is_configured() {
        tracing::warn!("{API_KEY_ENV} is not set; validation requests will fail");
        println!("  Warning: {API_KEY_ENV} is not set, sentence validation is disabled");
    }

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let router = create_router(AppState::with_model(config, vocabulary, client));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Vocabulary directory: {}", config.vocabulary_dir);
    println!("  Validation model: {}", config.validation_model);
    println!("  Context model: {}", config.context_model);
    println!("  Request timeout: {}s", config.request_timeout_secs);
}

// ============================================================================
// lists
// ============================================================================

async fn run_lists(config_path: Option<&str>, server: Option<String>) -> anyhow::Result<()> {
    let config = client_config(config_path, server)?;
    let client = ApiClient::from_config(&config)?;

    let summaries = client.list_languages().await?;
    if summaries.is_empty() {
        println!("No vocabulary lists on {}", client.base_url());
        return Ok(());
    }

    println!("{:<12} {:<28} {:>6}  {:<12} FILE", "ID", "NAME", "CARDS", "TYPE");
    for summary in summaries {
        println!(
            "{:<12} {:<28} {:>6}  {:<12} {}",
            summary.id, summary.name, summary.num_cards, summary.kind, summary.file
        );
    }
    Ok(())
}

// ============================================================================
// play
// ============================================================================

async fn run_game(
    config_path: Option<&str>,
    id: &str,
    server: Option<String>,
    no_speech: bool,
) -> anyhow::Result<()> {
    let config = client_config(config_path, server)?;
    let client = Arc::new(ApiClient::from_config(&config)?);

    let list = Arc::new(client.get_language(id).await?);
    let output: Arc<dyn SpeechOutput> = if no_speech || !config.speech.enabled {
        Arc::new(SilentOutput)
    } else {
        Arc::new(CommandSynthesizer::discover(&config.speech.synthesizer))
    };

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut game = SentenceGameController::new(
        list,
        client.clone(),
        build_capture(&config, events_tx),
        output,
        &config.speech.language,
    )?;

    println!("{}", game.session().list().name);
    println!("{HELP}");
    println!();
    println!("{}", render_prompt(game.session()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            Some(event) = events.recv() => {
                hear(&mut game, event)?;
                continue;
            }
        };

        let step = match parse_command(&line, game.session().phase()) {
            Command::Quit => break,
            Command::Help => {
                println!("{HELP}");
                Ok(())
            }
            Command::Unknown(cmd) => {
                println!("Unknown command {cmd}; type :help");
                Ok(())
            }
            Command::Context => {
                show_context(client.as_ref(), game.session().current_word()).await;
                Ok(())
            }
            Command::Listen => game.toggle_capture(),
            Command::Submit => {
                println!("Validating...");
                game.submit().await
            }
            Command::Next => game.next_word(),
            Command::Say(text) => say(&mut game, text).await,
        };

        if let Err(e) = step {
            if !e.is_recoverable() {
                return Err(e.into());
            }
            println!("{e}");
        }

        for warning in game.take_warnings() {
            println!("Warning: {warning}");
        }

        match game.session().phase() {
            Phase::Result => println!("{}", render_result(game.session())),
            _ => {
                if game.session().is_listening() {
                    println!("(listening... type :submit when done)");
                }
                println!("{}", render_prompt(game.session()));
            }
        }
    }

    println!("{}", render_summary(game.session(), chrono::Utc::now()));
    Ok(())
}

/// Applies a recognizer event and echoes what was heard.
fn hear(game: &mut SentenceGameController, event: RecognitionEvent) -> anyhow::Result<()> {
    let shows_text = matches!(event, RecognitionEvent::Interim(_) | RecognitionEvent::Final(_));
    if let Err(e) = game.recognition(event) {
        if !e.is_recoverable() {
            return Err(e.into());
        }
        tracing::debug!(error = %e, "Ignoring recognizer event");
    }
    for warning in game.take_warnings() {
        println!("Warning: {warning}");
    }
    if shows_text && game.session().is_listening() {
        println!("{}", render_transcript(game.session()));
    }
    Ok(())
}

/// Picks the speech recognizer. Falls back to typed input when the
/// `whisper` feature is off or no model is configured.
#[cfg(feature = "whisper")]
fn build_capture(
    config: &Config,
    events: mpsc::UnboundedSender<RecognitionEvent>,
) -> Box<dyn SpeechCapture> {
    use habla_game::{MicrophoneSource, StreamingCapture, WhisperTranscriber};

    let Some(model) = config.speech.recognition_model.as_deref() else {
        tracing::info!("No recognitionModel configured; speech input is off");
        return Box::new(UnavailableCapture);
    };
    match WhisperTranscriber::load(model) {
        Ok(transcriber) => Box::new(StreamingCapture::new(MicrophoneSource, transcriber, events)),
        Err(e) => {
            tracing::warn!(model, error = %e, "Speech recognizer unavailable");
            println!("Warning: {e}; type your sentences instead");
            Box::new(UnavailableCapture)
        }
    }
}

#[cfg(not(feature = "whisper"))]
fn build_capture(
    config: &Config,
    _events: mpsc::UnboundedSender<RecognitionEvent>,
) -> Box<dyn SpeechCapture> {
    if config.speech.recognition_model.is_some() {
        tracing::warn!("recognitionModel is set but habla was built without the whisper feature");
    }
    Box::new(UnavailableCapture)
}

async fn say(game: &mut SentenceGameController, text: String) -> habla_game::Result<()> {
    game.edit_transcript(text)?;
    println!("Validating...");
    game.submit().await
}

async fn show_context(client: &ApiClient, word: &habla_api::WordPair) {
    if let Some(context) = &word.context {
        println!("  {context}");
        return;
    }
    match client
        .generate_context(word.source_text(), word.target_text())
        .await
    {
        Ok(context) => println!("  {context}"),
        Err(e) => {
            tracing::warn!(error = %e, "Context generation failed");
            println!("  No example available right now.");
        }
    }
}
