//! CLI command definitions, routing, and tracing setup.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use citeflow_citations::render_plain;
use citeflow_core::{AnswerObserver, AnswerPipeline, ChatClient, PipelineConfig, replay_stream};
use citeflow_shared::{AnswerDocument, AppConfig, CiteflowError, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// citeflow: streamed answers with resolved citations.
#[derive(Parser)]
#[command(
    name = "citeflow",
    version,
    about = "Stream chat answers and resolve their citations into linked sources.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// How the finished answer is printed.
#[derive(Clone, Copy, Debug)]
struct OutputOptions {
    json: bool,
    raw: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a question and stream the answer.
    Ask {
        /// The question to send.
        question: String,

        /// Chat endpoint URL (overrides the config file).
        #[arg(long, env = "CITEFLOW_ENDPOINT")]
        endpoint: Option<String>,

        /// Print the whole answer document as JSON.
        #[arg(long)]
        json: bool,

        /// Print the final Markdown with citation markers left in place.
        #[arg(long, conflicts_with = "json")]
        raw: bool,

        /// Do not print the answer while it streams.
        #[arg(long)]
        no_live: bool,
    },

    /// Run a recorded event stream through the pipeline.
    Replay {
        /// Recorded stream file, or `-` for stdin.
        file: String,

        /// Bytes per simulated network chunk.
        #[arg(long, default_value = "64")]
        chunk_size: usize,

        /// Print the whole answer document as JSON.
        #[arg(long)]
        json: bool,

        /// Print the final Markdown with citation markers left in place.
        #[arg(long, conflicts_with = "json")]
        raw: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so they never mix
/// with the answer on stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "citeflow=warn",
        1 => "citeflow=info",
        2 => "citeflow=debug",
        _ => "citeflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask {
            question,
            endpoint,
            json,
            raw,
            no_live,
        } => cmd_ask(&question, endpoint, OutputOptions { json, raw }, !no_live).await,
        Command::Replay {
            file,
            chunk_size,
            json,
            raw,
        } => cmd_replay(&file, chunk_size, OutputOptions { json, raw }).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(
    question: &str,
    endpoint: Option<String>,
    output: OutputOptions,
    live: bool,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(endpoint) = endpoint {
        config.stream.endpoint = endpoint;
    }

    let client = ChatClient::new(&config.stream)?;
    info!(endpoint = %client.endpoint(), "asking question");

    // Live text on stdout would corrupt a JSON document.
    let observer = TerminalObserver::new(live && !output.json);
    observer.status("Waiting for answer");

    let bytes = match client.stream(question).await {
        Ok(bytes) => bytes,
        Err(e) => {
            observer.failed(&e);
            return Err(e.into());
        }
    };

    let pipeline = AnswerPipeline::new(PipelineConfig::from(&config));
    let result = pipeline.run_turn(bytes, &observer).await;
    finish(result, &observer, &config, output)
}

async fn cmd_replay(file: &str, chunk_size: usize, output: OutputOptions) -> Result<()> {
    let config = load_config()?;
    let data = read_input(file)?;
    info!(file, bytes = data.len(), chunk_size, "replaying recorded stream");

    let observer = TerminalObserver::new(false);
    observer.status("Replaying stream");

    let pipeline = AnswerPipeline::new(PipelineConfig::from(&config));
    let result = pipeline
        .run_turn(replay_stream(data, chunk_size), &observer)
        .await;
    finish(result, &observer, &config, output)
}

/// Print the finished document, or whatever text arrived before a failure.
fn finish(
    result: std::result::Result<AnswerDocument, CiteflowError>,
    observer: &TerminalObserver,
    config: &AppConfig,
    output: OutputOptions,
) -> Result<()> {
    let document = match result {
        Ok(document) => document,
        Err(e) => {
            if !observer.live {
                if let Some(partial) = e.partial_text().filter(|p| !p.is_empty()) {
                    eprintln!("Partial answer before the failure:\n\n{partial}\n");
                }
            }
            return Err(e.into());
        }
    };

    if output.json {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else if output.raw {
        println!("{}", document.final_text);
    } else {
        println!("{}", render_plain(&document.final_text, &config.render));
        print_sources(&document);
    }
    Ok(())
}

fn print_sources(document: &AnswerDocument) {
    if document.sources.is_empty() {
        return;
    }
    println!();
    println!("  Sources:");
    for source in &document.sources {
        match &source.source_url {
            Some(url) => println!("  [{}] {} <{url}>", source.ordinal, source.title),
            None => println!("  [{}] {}", source.ordinal, source.title),
        }
    }
}

fn read_input(file: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    if file == "-" {
        std::io::stdin()
            .read_to_end(&mut data)
            .wrap_err("failed to read stream from stdin")?;
    } else {
        let path = PathBuf::from(file);
        if !path.is_file() {
            return Err(eyre!("no recorded stream at '{file}'"));
        }
        data = std::fs::read(&path).map_err(|e| CiteflowError::io(&path, e))?;
    }
    Ok(data)
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Terminal observer
// ---------------------------------------------------------------------------

/// Prints snapshot growth to stdout as it arrives, with a spinner on stderr
/// until the first text shows up.
struct TerminalObserver {
    spinner: ProgressBar,
    live: bool,
    printed: AtomicUsize,
}

impl TerminalObserver {
    fn new(live: bool) -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            live,
            printed: AtomicUsize::new(0),
        }
    }

    fn status(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    /// Close the live block so the final document starts on a fresh line.
    fn end_live_block(&self) {
        if self.printed.load(Ordering::Relaxed) > 0 {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "\n\n----------------------------------------\n");
            let _ = out.flush();
        }
    }
}

impl AnswerObserver for TerminalObserver {
    fn snapshot(&self, seq: usize, text: &str) {
        if !self.live {
            self.spinner.set_message(format!("Receiving answer ({seq} chunks)"));
            return;
        }
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }

        // Snapshots only ever grow, so print the unseen suffix.
        let seen = self.printed.swap(text.len(), Ordering::Relaxed);
        if let Some(suffix) = text.get(seen..) {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(suffix.as_bytes());
            let _ = out.flush();
        }
    }

    fn finalized(&self, _document: &AnswerDocument) {
        self.spinner.finish_and_clear();
        self.end_live_block();
    }

    fn failed(&self, _error: &CiteflowError) {
        self.spinner.finish_and_clear();
        if self.printed.load(Ordering::Relaxed) > 0 {
            println!();
        }
    }
}
