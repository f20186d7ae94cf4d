// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chapterwai::app_config::{self, Config, TranslationProvider};
use chapterwai::chapter::Chapter;
use chapterwai::context::ContextExtractor;
use chapterwai::database::{DatabaseConnection, Repository};
use chapterwai::pipeline::{BatchReport, JobOrchestrator, OrchestratorSettings};
use chapterwai::providers;
use chapterwai::store::ChapterStore;
use chapterwai::translation::{Translator, TranslatorSettings};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Deepseek,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    Ollama,
    Mock,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Deepseek => TranslationProvider::DeepSeek,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::Mock => TranslationProvider::Mock,
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

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate chapters by id
    Translate {
        /// Chapter ids, processed in the given order
        #[arg(value_name = "CHAPTER_ID", required = true)]
        ids: Vec<String>,

        /// Model name to use for translation
        #[arg(short, long)]
        model: Option<String>,

        /// Print the batch acknowledgement and only report through logs
        #[arg(long)]
        detach: bool,
    },

    /// Translate pending chapters, oldest first
    Pending {
        /// Maximum number of chapters to process
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Model name to use for translation
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Translate the untranslated chapters of a story in a number range
    Range {
        story_id: String,
        from: u32,
        to: u32,

        /// Model name to use for translation
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Add a pending chapter from a text file
    Add {
        /// Source text file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Story the chapter belongs to
        #[arg(long)]
        story: String,

        /// Chapter number within the story
        #[arg(long)]
        number: u32,

        /// Chapter title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
    },

    /// Show a chapter's status and audit trail
    Status {
        #[arg(value_name = "CHAPTER_ID")]
        id: String,
    },

    /// Move a failed chapter back to pending
    Requeue {
        #[arg(value_name = "CHAPTER_ID")]
        id: String,
    },

    /// Reclaim chapters stuck in translating
    Sweep {
        /// Age in seconds after which a translating chapter is reclaimed
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Translate a standalone text file without chapter bookkeeping
    Text {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Model name to use for translation
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Generate shell completions for chapterwai
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// chapterwai - chaptered fiction translation with AI
///
/// Translates stored story chapters through an LLM while keeping a
/// per-story context of characters, terms, settings and plot points.
#[derive(Parser, Debug)]
#[command(name = "chapterwai")]
#[command(version = "0.1.0")]
#[command(about = "AI-powered chaptered fiction translation")]
#[command(long_about = "chapterwai translates serialized fiction chapter by chapter, keeping names and terms consistent.

EXAMPLES:
    chapterwai add --story s1 --number 1 ch1.txt   # Store a pending chapter
    chapterwai translate <CHAPTER_ID>               # Translate one chapter
    chapterwai pending -n 20                        # Translate up to 20 pending chapters
    chapterwai range s1 1 50                        # Translate chapters 1-50 of story s1
    chapterwai status <CHAPTER_ID>                  # Show status and logs
    chapterwai sweep --ttl-secs 600                 # Reclaim stuck chapters
    chapterwai text notes.txt -o notes.vi.txt       # Translate a standalone file
    chapterwai completions bash > chapterwai.bash   # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    deepseek  - DeepSeek API (default, requires DEEPSEEK_API_KEY)
    openai    - OpenAI API (requires OPENAI_API_KEY)
    anthropic - Anthropic API (requires ANTHROPIC_API_KEY)
    ollama    - Local Ollama server
    mock      - Offline mock for dry runs")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Translation provider to use
    #[arg(short, long, value_enum, global = true)]
    provider: Option<CliTranslationProvider>,

    /// Source language code (e.g., 'zh', 'en')
    #[arg(short, long, global = true)]
    source_language: Option<String>,

    /// Target language code (e.g., 'vi', 'en')
    #[arg(short, long, global = true)]
    target_language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: String,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<String>,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,
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
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
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
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Everything a command needs
struct App {
    config: Config,
    repository: Arc<Repository>,
    translator: Translator,
    orchestrator: JobOrchestrator,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let db_path = config.database_file()?;
        let db = DatabaseConnection::new(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        let repository = Arc::new(Repository::new(db));

        let provider = providers::build_provider(&config.translation)?;
        let translator = Translator::new(provider.clone(), TranslatorSettings::from_config(&config)?);
        let extractor = ContextExtractor::new(provider, config.translation.common.extraction.clone());
        let settings = OrchestratorSettings::from_config(&config.pipeline, config.translation.get_model());

        let orchestrator = JobOrchestrator::new(
            repository.clone(),
            repository.clone(),
            translator.clone(),
            extractor,
            settings,
        );

        info!(
            "Using {} ({}), {} -> {}",
            config.translation.provider.display_name(),
            config.translation.get_model(),
            config.source_language,
            config.target_language
        );

        Ok(Self {
            config,
            repository,
            translator,
            orchestrator,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once; the level is narrowed after loading the config
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "chapterwai", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());

    let app = App::build(config)?;
    run_command(cli.command, &app).await
}

fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let config_path = Path::new(&cli.config_path);
    if !config_path.exists() {
        warn!("Config file not found at '{}', creating default config.", cli.config_path);
    }
    let mut config = Config::load_or_create(config_path)?;

    // Override config with CLI options if provided
    if let Some(provider) = &cli.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(source_lang) = &cli.source_language {
        config.source_language = source_lang.clone();
    }
    if let Some(target_lang) = &cli.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(database) = &cli.database {
        config.database_path = Some(database.clone());
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_command(command: Commands, app: &App) -> Result<()> {
    match command {
        Commands::Translate { ids, model, detach } => {
            let (ack, handle) = app.orchestrator.spawn_batch(ids, model);
            if detach {
                println!("{}", serde_json::to_string_pretty(&ack)?);
                // Keep the process alive until the batch is done
                handle.await.context("Batch task failed")?;
            } else {
                let report = handle.await.context("Batch task failed")?;
                print_report(&report);
            }
        }

        Commands::Pending { limit, model } => {
            let report = app.orchestrator.translate_pending(limit, model.as_deref()).await?;
            print_report(&report);
        }

        Commands::Range { story_id, from, to, model } => {
            if from > to {
                return Err(anyhow!("Invalid range: {} > {}", from, to));
            }
            let report = app
                .orchestrator
                .translate_range(&story_id, from, to, model.as_deref())
                .await?;
            print_report(&report);
        }

        Commands::Add { file, story, number, title } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read chapter file: {}", file.display()))?;
            let title = title.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let chapter = Chapter::new(story, number, title, content);
            app.repository.insert_chapter(&chapter).await?;
            info!("Added chapter {} ({} chars)", chapter.chapter_number, chapter.original_content.chars().count());
            println!("{}", chapter.id);
        }

        Commands::Status { id } => {
            let chapter = app
                .repository
                .get_by_id(&id)
                .await?
                .ok_or_else(|| anyhow!("Chapter not found: {}", id))?;
            println!(
                "{} [{} #{}] {}: {}",
                chapter.id, chapter.story_id, chapter.chapter_number, chapter.title, chapter.status
            );
            for entry in &chapter.logs {
                let data = entry.data.as_ref().map(|d| format!(" {}", d)).unwrap_or_default();
                println!(
                    "  {} {:<7} {}{}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.level,
                    entry.message,
                    data
                );
            }
        }

        Commands::Requeue { id } => {
            let chapter = app.orchestrator.resubmit(&id).await?;
            println!("{}: {}", chapter.id, chapter.status);
        }

        Commands::Sweep { ttl_secs } => {
            let ttl = Duration::from_secs(ttl_secs.unwrap_or(app.config.pipeline.stuck_ttl_secs));
            let reclaimed = app.orchestrator.sweep_stuck(ttl).await?;
            info!("Reclaimed {} stuck chapter(s)", reclaimed.len());
            for id in reclaimed {
                println!("{}", id);
            }
        }

        Commands::Text { file, output, model } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read input file: {}", file.display()))?;
            let model = model.unwrap_or_else(|| app.config.translation.get_model());
            let translation = app
                .translator
                .translate_long_text(&text, None, &model)
                .await
                .map_err(|e| anyhow!("Translation failed: {}", e))?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &translation.text)
                        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
                    info!("Success: {}", path.display());
                }
                None => println!("{}", translation.text),
            }
            info!("{}", translation.usage.summary());
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    for outcome in &report.outcomes {
        match &outcome.error {
            Some(e) => error!("{}: {} ({})", outcome.chapter_id, outcome.result, e),
            None => info!("{}: {}", outcome.chapter_id, outcome.result),
        }
    }
    info!("{}", report.summary());
    if report.usage.requests > 0 {
        info!("{}", report.usage.summary());
    }
}
