use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sidechat::cli::{self, Args};
use sidechat::config::AppConfig;
use sidechat::engine::StreamingCallEngine;
use sidechat::orchestrator::ChatOrchestrator;
use sidechat::sink::ChannelSink;
use sidechat::workspace::LocalWorkspace;

fn init_tracing() {
    // stdout carries the transcript; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SIDECHAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    println!("========================================");
    println!("  sidechat - workspace chat (v{})", env!("CARGO_PKG_VERSION"));
    println!("========================================");

    // Auto-generate config file on first run
    let config_path = AppConfig::config_path()?;
    if !config_path.exists() {
        let path = AppConfig::save_default()?;
        println!("[Config] Created default config: {}", path.display());
        println!("[Config] Edit it to set your api_key and backends.");
    }

    let mut config = AppConfig::load()?;
    if let Some(index) = args.backend {
        config.llm.default_backend = index;
    }
    if let Some(name) = &args.write_to_file {
        config.output.write_to_file = true;
        config.output.file_name = name.clone();
    }
    config.validate()?;

    let engine = StreamingCallEngine::from_config(&config)?;
    println!(
        "[Config] {} backends, starting at '{}', API: {}",
        config.llm.backends.len(),
        config.llm.backends[config.llm.default_backend].name,
        config.llm.api_base.as_deref().unwrap_or("(default)")
    );

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("Workspace not found: {}", args.root.display()))?;
    let workspace = Arc::new(LocalWorkspace::new(&root, config.index.clone()));
    let (sink, events) = ChannelSink::new(&root);

    let chat = ChatOrchestrator::new(engine, workspace, Arc::new(sink));
    chat.select_backend(config.llm.default_backend)?;
    chat.set_output_mode(config.output.mode());

    let names = chat.refresh_index().await?;
    println!("[Index] {} file names under {}", names, root.display());

    cli::run_chat_loop(Arc::new(chat), events, &root).await
}
