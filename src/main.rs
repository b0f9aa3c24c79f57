//! chatshot CLI: render a batch of messaging screenshots from the shell

#[cfg(feature = "cdp")]
use std::path::PathBuf;
#[cfg(feature = "cdp")]
use std::sync::Arc;
#[cfg(feature = "cdp")]
use std::time::Duration;

#[cfg(feature = "cdp")]
use anyhow::Context;
#[cfg(feature = "cdp")]
use clap::Parser;
#[cfg(feature = "cdp")]
use log::{info, LevelFilter};
#[cfg(feature = "cdp")]
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

#[cfg(feature = "cdp")]
use chatshot::{
    run_batch, BatchRequest, CancelFlag, Corpus, EvidenceImage, PipelineConfig, RenderPool,
    TemplateRegistry,
};

#[cfg(feature = "cdp")]
#[derive(Parser, Debug)]
#[command(name = "chatshot", version, about = "Batch messaging-app screenshot renderer")]
struct Cli {
    /// Platform template to render with (imessage, whatsapp, messenger, signal)
    #[arg(long, default_value = "imessage")]
    platform: String,

    /// Number of screenshots to generate
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Messages shown before the inserted image
    #[arg(long, default_value_t = 2)]
    before: usize,

    /// Messages shown after the inserted image
    #[arg(long, default_value_t = 2)]
    after: usize,

    /// Evidence image files (at least one)
    #[arg(long, required = true, num_args = 1..)]
    images: Vec<PathBuf>,

    /// Conversation corpus JSON (converter output); falls back to a
    /// built-in transcript when omitted
    #[arg(long)]
    conversations: Option<PathBuf>,

    /// Keep only conversations from these source labels (e.g. subreddits)
    #[arg(long, value_delimiter = ',')]
    sources: Vec<String>,

    /// Output archive path
    #[arg(long, default_value = "screenshots.zip")]
    out: PathBuf,

    /// Browser pool size (defaults to CPU count, capped at 8)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-job capture timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[cfg(not(feature = "cdp"))]
fn main() {
    eprintln!("chatshot was built without the `cdp` feature; no renderer backend is available");
    std::process::exit(1);
}

#[cfg(feature = "cdp")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .context("failed to initialize logging")?;

    let mut config = PipelineConfig::default();
    if let Some(n) = cli.concurrency {
        config.pool_size = n;
    }
    config.capture_timeout = Duration::from_secs(cli.timeout_secs);

    let mut images = Vec::with_capacity(cli.images.len());
    for path in &cli.images {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
        let image = EvidenceImage::from_bytes(bytes)
            .with_context(|| format!("validating image {}", path.display()))?;
        images.push(Arc::new(image));
    }

    let conversations = match &cli.conversations {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading corpus {}", path.display()))?;
            let mut corpus = Corpus::from_json(&json).context("parsing corpus JSON")?;
            corpus.filter_sources(&cli.sources);
            let threads: Vec<_> = corpus.into_threads().into_iter().map(Arc::new).collect();
            info!("loaded {} usable conversations", threads.len());
            threads
        }
        None => {
            info!("no corpus supplied; using the built-in fallback transcript");
            Vec::new()
        }
    };

    let registry = Arc::new(TemplateRegistry::builtin());
    let canvas = registry
        .get(&cli.platform)
        .map(|t| t.canvas)
        .unwrap_or_default();

    let pool = Arc::new(
        RenderPool::new(
            Arc::new(chatshot::CdpFactory::new(canvas)),
            config.pool_size,
            config.capture_timeout,
        )
        .await
        .context("starting the render pool")?,
    );

    let request = BatchRequest {
        platform_id: cli.platform.clone(),
        count: cli.count,
        messages_before: cli.before,
        messages_after: cli.after,
        images,
        conversations,
    };

    let output = run_batch(pool, registry, request, CancelFlag::new())
        .await
        .context("batch failed")?;

    std::fs::write(&cli.out, &output.archive)
        .with_context(|| format!("writing archive {}", cli.out.display()))?;

    info!(
        "wrote {} ({} of {} jobs succeeded)",
        cli.out.display(),
        output.manifest.succeeded,
        output.manifest.total
    );
    println!("{}", serde_json::to_string_pretty(&output.manifest)?);

    Ok(())
}
