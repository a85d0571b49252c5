//! Document distillation CLI
//!
//! Run with: cargo run -p ruvector-distill --features cli --bin distill -- \
//!     --file report.txt --pages 100 --goal "summarize chapter 3"

use anyhow::Context;
use clap::Parser;
use console::style;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ruvector_distill::{
    CancellationToken, ChatCompletionsProvider, DistillConfig, Document, DocumentCache,
    DocumentPipeline, Progress, ProgressCallback,
};

#[derive(Parser, Debug)]
#[command(
    name = "distill",
    version,
    about = "Distill a large document into a goal-focused answer streamed from an LLM"
)]
struct Cli {
    /// Plain-text document to distill
    #[arg(long)]
    file: PathBuf,

    /// Page count of the source document (drives chunk sizing)
    #[arg(long)]
    pages: u32,

    /// What you want from the document
    #[arg(long)]
    goal: String,

    /// Display name used in prompts (defaults to the file name)
    #[arg(long)]
    name: Option<String>,

    /// TOML configuration file
    #[arg(long, env = "DISTILL_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the document cache
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ruvector_distill=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => DistillConfig::from_file(path)?,
        None => DistillConfig::default(),
    };

    let content = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let name = cli.name.clone().unwrap_or_else(|| {
        cli.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });
    let document = Document::new(name.clone(), content, cli.pages);

    tracing::info!("Configuration loaded");
    tracing::info!("  - LLM model: {}", config.llm.model);
    tracing::info!("  - Batch size: {}", config.pipeline.batch_size);
    let use_cache = config.cache.enabled && !cli.no_cache;
    tracing::info!("  - Cache: {}", if use_cache { "on" } else { "off" });

    let provider = Arc::new(ChatCompletionsProvider::new(&config.llm)?);
    let mut pipeline = DocumentPipeline::new(config.clone(), provider);
    if use_cache {
        if let Some(cache) =
            DocumentCache::open_or_disabled(&config.cache.path, config.cache.ttl_hours)
        {
            pipeline = pipeline.with_cache(Arc::new(cache));
        }
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", style("Cancelling...").yellow());
            on_ctrl_c.cancel();
        }
    });

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    let progress_bar = bar.clone();
    let on_progress: ProgressCallback = Arc::new(move |p: Progress| {
        progress_bar.set_position(p.percent() as u64);
        progress_bar.set_message(format!("{}: {}", p.stage, p.status));
    });

    let result = pipeline
        .process(&document, &cli.goal, &name, on_progress, &cancel)
        .await;
    bar.finish_and_clear();
    let mut stream = result?;

    println!("{}\n", style(format!("# {}", cli.goal)).bold());
    let mut stdout = std::io::stdout();
    while let Some(token) = stream.next().await {
        write!(stdout, "{}", token?)?;
        stdout.flush()?;
    }
    println!();

    Ok(())
}
