use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use event_detection_engine::config::{ExecutorKind, read_config_file};
use event_detection_engine::engine::Engine;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(short)]
    file: String,

    /// Override the configured executor
    #[arg(long, value_enum)]
    executor: Option<ExecutorKind>,

    /// Override the configured checkpoint mode
    #[arg(long)]
    checkpoint: Option<bool>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("event_detection_engine", LevelFilter::DEBUG),
        ("ede", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = read_config_file(&args.file)?;
    if let Some(executor) = args.executor {
        config.mode.executor = executor;
    }
    if let Some(checkpoint) = args.checkpoint {
        config.mode.checkpoint = checkpoint;
    }

    let engine = Engine::from_config(Arc::new(config))?;
    engine.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    init();
    dotenv::dotenv().ok();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    match run(args).await {
        Ok(()) => info!("all duties finished"),
        Err(e) => {
            error!("{e:#}");
            exit(1);
        }
    }
}
