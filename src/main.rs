mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ontorag::chat::ChatMode;
use ontorag::config::Config;

use commands::AppContext;

#[derive(Parser, Debug)]
#[command(
    name = "ontorag",
    version,
    about = "RAG application using an OpenAI-compatible LLM server and Memgraph for the knowledge graph",
    long_about = None
)]
struct Cli {
    /// Build the vector index and the knowledge graph from the PDF folder
    #[arg(short = 'b', long)]
    build_rag: bool,

    /// Reload the prompt tables from the configured workbooks
    #[arg(short = 'u', long)]
    update_table: bool,

    /// Chat with the vector index through the LLM
    #[arg(short = 'v', long)]
    vector_chat: bool,

    /// Chat with the knowledge graph through the LLM. Compatible with --ontology
    #[arg(short = 'g', long)]
    graph_chat: bool,

    /// Use the ontology when building or querying the knowledge graph
    #[arg(short = 'o', long)]
    ontology: bool,

    /// Chat with both the knowledge graph and the vector index. Compatible with --ontology
    #[arg(short = 'c', long)]
    chat: bool,

    /// Configuration file (defaults to config.yaml next to the executable)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mirror log records to stderr
    #[arg(long)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args_os().len() == 1 {
        // Help goes to stdout; a failed write leaves nothing else to do
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    }
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(issues) => {
            for issue in &issues {
                eprintln!("{issue}");
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_tracing(&config, &cli.log_format, cli.verbose) {
        eprintln!("Failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }
    for issue in &config.warnings {
        tracing::warn!("{issue}");
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Due to this error, the program will exit: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    tracing::info!(
        build_rag = cli.build_rag,
        update_table = cli.update_table,
        vector_chat = cli.vector_chat,
        graph_chat = cli.graph_chat,
        chat = cli.chat,
        ontology = cli.ontology,
        "ontorag starting"
    );

    let app = AppContext::bootstrap(config).await?;
    let result = dispatch(&cli, &app).await;
    app.close();
    result
}

async fn dispatch(cli: &Cli, app: &AppContext) -> Result<()> {
    if cli.build_rag {
        commands::build_rag(app, cli.ontology).await?;
    }
    if cli.update_table {
        commands::update_tables(app).await?;
    }
    if cli.vector_chat {
        commands::chat(app, ChatMode::Vector, cli.ontology).await?;
    }
    if cli.graph_chat {
        commands::chat(app, ChatMode::Graph, cli.ontology).await?;
    }
    if cli.chat {
        commands::chat(app, ChatMode::Combined, cli.ontology).await?;
    }
    Ok(())
}

/// Log records go to the configured log file; `--verbose` mirrors them to stderr
fn setup_tracing(config: &Config, format: &str, verbose: bool) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_file_name())?;
    let level = LevelFilter::from_level(config.log_level());

    let file_layer = match format {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::sync::Mutex::new(file))
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };
    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(file_layer.with_filter(level))
        .with(stderr_layer.with_filter(level))
        .init();
    Ok(())
}
