//! Page Sentry - Main entry point
//!
//! Runs a single extraction pass over a document snapshot given as a JSON
//! tree description and prints the canonical rendering to stdout.

use page_sentry::{
    notification_channel, Config, DocumentTree, ExtractionPipeline, LogQueue, NodeSpec, StdoutSink,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let tree_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("Usage: page-sentry <tree.json> [config.toml]");
            std::process::exit(2);
        }
    };

    // Load configuration
    let config = match args.next() {
        Some(path) => Config::load_from_path(path.into()),
        None => Config::load(),
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !config.general.enabled {
        info!("Sentry is disabled in configuration, exiting");
        return Ok(());
    }

    let spec: NodeSpec = serde_json::from_str(&std::fs::read_to_string(&tree_path)?)?;
    let tree = DocumentTree::from_spec(&spec);

    let (notifier, mut notifications) = notification_channel();
    let mut pipeline = ExtractionPipeline::from_config(&config, StdoutSink, notifier)?;

    let outcome = pipeline.run_pass(&tree);
    info!("Pass finished: {:?}", outcome);

    let mut log = LogQueue::with_defaults();
    while let Ok(message) = notifications.try_recv() {
        log.push(message);
    }
    for entry in log.entries() {
        info!("{}", entry.text);
    }
    Ok(())
}
