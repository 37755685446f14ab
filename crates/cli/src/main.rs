use clap::{ArgGroup, Args, Parser, Subcommand};
use novelist_adapters::{
    create_completion_client, AdapterError, FileExporter, StabilityImageClient,
};
use novelist_core::{
    Config, ConfigError, FanoutLogSink, FileLogSink, GenerationRequest, GenerationResult,
    ImageSynthesizer, LanguageModel, LanguageModelError, LogLevel, LogRecord, LogSink,
    NovelGenerator, PromptError, PromptRegistry, SharedLogSink, SinkLogger, StdoutLogSink,
    TranslateError, TranslationRequest, Translator, WritingStyle,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    // A missing .env is not an error; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let sink = build_sink(&cli);
    let filter = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(err) = SinkLogger::install(sink.clone(), filter) {
        eprintln!("failed to install logger: {err}");
    }

    match cli.command {
        Command::Generate(args) => run_generate(&cli.config, args, sink.as_ref()),
        Command::Translate(args) => run_translate(&cli.config, args, sink.as_ref()),
        Command::Styles => {
            print_styles();
            Ok(())
        }
        Command::Config(command) => handle_config(&cli.config, command, sink.as_ref()),
    }
}

fn build_sink(cli: &Cli) -> SharedLogSink {
    let min_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let stdout: SharedLogSink = Arc::new(StdoutLogSink::with_min_level(min_level));
    let mut fanout = FanoutLogSink::new(vec![stdout]);
    match FileLogSink::open(&cli.log_file) {
        Ok(file) => fanout.push(Arc::new(file)),
        Err(err) => eprintln!("cannot open log file {}: {err}", cli.log_file.display()),
    }
    Arc::new(fanout)
}

/// Reads the config file (defaults when absent) and overlays the environment.
fn load_config(config_path: &Path) -> Result<Config, CliError> {
    let mut config = Config::load_or_default(config_path)?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

fn run_generate(config_path: &Path, args: GenerateArgs, sink: &dyn LogSink) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let prompts = PromptRegistry::from_prompt_config(&config.prompts)?;
    let model = create_completion_client(&config.llm)?;

    let images = if config.generation.generate_cover && !args.no_cover {
        match StabilityImageClient::from_config(&config.image) {
            Ok(client) => Some(client),
            Err(err) => {
                sink.log(LogRecord::new(
                    LogLevel::Warn,
                    format!("Cover generation disabled: {err}"),
                ));
                None
            }
        }
    } else {
        None
    };
    let exporter = FileExporter::new();

    let request = GenerationRequest::new(args.prompt)
        .with_chapter_count(args.chapters)
        .with_style(args.style)
        .with_output_dir(args.output_dir.unwrap_or_else(|| config.generation.output_dir.clone()))
        .with_author(args.author.unwrap_or_else(|| config.generation.author.clone()));

    sink.log(LogRecord::new(
        LogLevel::Info,
        format!(
            "Generating novel with {} ({})",
            config.llm.model_name, config.llm.interface_format
        ),
    ));

    let result = NovelGenerator::new(&prompts, sink, model.as_ref(), &exporter)
        .with_images(images.as_ref().map(|client| client as &dyn ImageSynthesizer))
        .with_generation_config(&config.generation)
        .generate_novel(&request);

    println!("{}", serde_json::to_string_pretty(&result)?);
    match result {
        GenerationResult::Success { .. } => Ok(()),
        GenerationResult::Error { message } => Err(CliError::GenerationFailed(message)),
    }
}

fn run_translate(config_path: &Path, args: TranslateArgs, sink: &dyn LogSink) -> Result<(), CliError> {
    let text = match &args.file {
        Some(path) => fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.clone(),
            source,
        })?,
        None => args.text.clone().unwrap_or_default(),
    };

    let config = load_config(config_path)?;
    let prompts = PromptRegistry::from_prompt_config(&config.prompts)?;
    let model = create_completion_client(&config.llm)?;

    let request = TranslationRequest::new(text, args.target)
        .with_source_language(args.source)
        .with_context(args.context)
        .with_skip_same_language(!args.force);
    let translated = Translator::new(&prompts, sink).translate_text(model.as_ref(), &request)?;

    match args.output {
        Some(path) => {
            fs::write(&path, &translated).map_err(|source| CliError::Io {
                path: path.clone(),
                source,
            })?;
            println!("Translation saved to {}", path.display());
        }
        None => println!("{translated}"),
    }
    Ok(())
}

fn print_styles() {
    for style in WritingStyle::ALL {
        let profile = style.profile();
        println!("{:<18} {}", style.key(), profile.name);
        println!("{:<18} {}", "", profile.description);
    }
}

fn handle_config(config_path: &Path, command: ConfigCommand, sink: &dyn LogSink) -> Result<(), CliError> {
    match command {
        ConfigCommand::Init(args) => run_config_init(config_path, args, sink),
        ConfigCommand::TestLlm => run_test_llm(config_path, sink),
    }
}

fn run_config_init(config_path: &Path, args: InitArgs, sink: &dyn LogSink) -> Result<(), CliError> {
    if config_path.exists() && !args.force {
        return Err(CliError::ConfigExists(config_path.to_path_buf()));
    }
    Config::new().to_path(config_path)?;
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!("Wrote default configuration to {}", config_path.display()),
    ));
    Ok(())
}

fn run_test_llm(config_path: &Path, sink: &dyn LogSink) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    sink.log(LogRecord::new(
        LogLevel::Info,
        format!(
            "Testing LLM configuration: {} via {}",
            config.llm.model_name, config.llm.interface_format
        ),
    ));

    let model = create_completion_client(&config.llm)?;
    match model.complete("You are a helpful assistant.", "Please reply 'OK'") {
        Ok(response) if response.trim().is_empty() => {
            sink.log(LogRecord::new(LogLevel::Error, "LLM test failed: empty response"));
            Err(CliError::TestFailed("LLM returned an empty response".to_string()))
        }
        Ok(response) => {
            sink.log(LogRecord::new(LogLevel::Info, "LLM configuration works"));
            sink.log(LogRecord::new(LogLevel::Debug, format!("Test reply: {response}")));
            Ok(())
        }
        Err(err) => {
            sink.log(LogRecord::new(LogLevel::Error, format!("LLM test failed: {err}")));
            Err(CliError::Model(err))
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("config file already exists: {0} (use --force to overwrite)")]
    ConfigExists(PathBuf),
    #[error("failed to load prompts: {0}")]
    Prompt(#[from] PromptError),
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("LLM call failed: {0}")]
    Model(#[from] LanguageModelError),
    #[error("translation failed: {0}")]
    Translate(#[from] TranslateError),
    #[error("failed to access `{path}`: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to serialize result: {0}")]
    Json(#[from] serde_json::Error),
    #[error("novel generation failed: {0}")]
    GenerationFailed(String),
    #[error("{0}")]
    TestFailed(String),
}

#[derive(Parser)]
#[command(name = "novelist", version, about = "Generate and translate novels with a language model")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// File that receives every log record
    #[arg(long, global = true, default_value = "novel_generation.log")]
    log_file: PathBuf,

    /// Print debug records, including prompts and raw responses
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a complete novel from a story prompt
    Generate(GenerateArgs),
    /// Translate text into another language
    Translate(TranslateArgs),
    /// List the available writing styles
    Styles,
    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a configuration file with default values
    Init(InitArgs),
    /// Send a short test prompt to the configured LLM
    TestLlm,
}

#[derive(Args)]
struct InitArgs {
    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct GenerateArgs {
    /// Story idea the novel is built from
    prompt: String,

    /// Number of chapters; chosen by the model when omitted
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    chapters: Option<u32>,

    /// Writing style key (see `novelist styles`); chosen by the model when omitted
    #[arg(long, value_name = "STYLE")]
    style: Option<WritingStyle>,

    /// Base directory for run output
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    author: Option<String>,

    /// Skip cover image generation
    #[arg(long)]
    no_cover: bool,
}

#[derive(Args)]
#[command(group(ArgGroup::new("input").required(true).args(["text", "file"])))]
struct TranslateArgs {
    /// Text to translate
    #[arg(long, value_name = "TEXT")]
    text: Option<String>,

    /// File containing the text to translate
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Target language (e.g. en, fr, zh)
    #[arg(long, value_name = "LANG")]
    target: String,

    /// Source language; detected when omitted
    #[arg(long, value_name = "LANG")]
    source: Option<String>,

    /// Extra context to improve the translation
    #[arg(long, value_name = "TEXT")]
    context: Option<String>,

    /// Write the translation to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Translate even when the text is already in the target language
    #[arg(long)]
    force: bool,
}
