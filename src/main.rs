// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info};
use std::io::Write;
use std::path::{Path, PathBuf};

use droneterms::Controller;
use droneterms::app_config::{self, BackendProvider, Config};

/// CLI Wrapper for BackendProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliBackendProvider {
    #[value(name = "openai")]
    OpenAI,
    Ollama,
}

impl From<CliBackendProvider> for BackendProvider {
    fn from(cli_provider: CliBackendProvider) -> Self {
        match cli_provider {
            CliBackendProvider::OpenAI => BackendProvider::OpenAI,
            CliBackendProvider::Ollama => BackendProvider::Ollama,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract terms from a document or every document in a directory
    Extract(ExtractArgs),

    /// Generate shell completions for droneterms
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Input text file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Extraction backend to use
    #[arg(short, long, value_enum)]
    provider: Option<CliBackendProvider>,

    /// Model name to use for extraction
    #[arg(short, long)]
    model: Option<String>,

    /// Subject area of the terms
    #[arg(short, long)]
    domain: Option<String>,

    /// API key for OpenAI-compatible backends
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Backend endpoint URL
    #[arg(long, env = "OPENAI_BASE_URL")]
    endpoint: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Skip text cleaning
    #[arg(long)]
    no_clean: bool,

    /// Do not write CSV files or the term database
    #[arg(long)]
    no_save: bool,
}

/// DroneTerms - domain term extraction with LLMs
///
/// Splits long documents into token-bounded chunks, asks a language model for
/// the domain terms of each chunk and merges the answers into one glossary.
#[derive(Parser, Debug)]
#[command(name = "droneterms")]
#[command(version)]
#[command(about = "LLM-based domain term extraction")]
#[command(long_about = "DroneTerms extracts domain terms with definitions, translations and relevance from text documents.

EXAMPLES:
    droneterms extract article.txt                      # Extract using default config
    droneterms extract -p ollama -m qwen2.5 article.txt # Use specific provider and model
    droneterms extract --log-level debug papers/        # Process entire directory with debug logging
    droneterms completions bash > droneterms.bash       # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    openai - OpenAI-compatible API (requires API key, see OPENAI_API_KEY / OPENAI_BASE_URL)
    ollama - Local Ollama server (default: llama3.1:8b)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // Filtering is done by the global max level so it can change later
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {:<5} {}\x1B[0m",
                color,
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

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config is loaded
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "droneterms", &mut std::io::stdout());
            Ok(())
        }
        Commands::Extract(args) => run_extract(args).await,
    }
}

/// Apply command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, options: &ExtractArgs) {
    if let Some(provider) = &options.provider {
        config.extraction.provider = provider.clone().into();
    }

    let provider_config = config.extraction.active_provider_config_mut();
    if let Some(model) = &options.model {
        provider_config.model = model.clone();
    }
    if let Some(api_key) = &options.api_key {
        provider_config.api_key = api_key.clone();
    }
    if let Some(endpoint) = &options.endpoint {
        provider_config.endpoint = endpoint.clone();
    }

    if let Some(domain) = &options.domain {
        config.domain = domain.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
    if options.no_clean {
        config.cleaning.enabled = false;
    }
    if options.no_save {
        config.output.save_csv = false;
        config.output.save_term_db = false;
    }
}

async fn run_extract(options: ExtractArgs) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level_filter(&level));
    }

    let mut config = Config::load_or_create(Path::new(&options.config_path))?;
    apply_overrides(&mut config, &options);
    log::set_max_level(level_filter(&config.log_level));

    config.validate().context("Configuration validation failed")?;

    let controller = Controller::with_config(config)?;
    controller.test_connection().await?;

    if options.input_path.is_file() {
        controller.run(options.input_path.clone()).await?;
    } else if options.input_path.is_dir() {
        let summary = controller.run_folder(options.input_path.clone()).await?;
        if summary.processed == 0 {
            return Err(anyhow!("No document in {:?} was processed", options.input_path));
        }
        info!("{} documents processed, {} failed", summary.processed, summary.failed);
    } else {
        return Err(anyhow!("Input path does not exist: {:?}", options.input_path));
    }

    Ok(())
}
