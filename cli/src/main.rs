//! CLI entrypoint for toolchat
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolchat_application::{
    ConversationOrchestrator, NoTurnProgress, TokenCredential, ToolBackend, TurnProgress,
};
use toolchat_domain::adapt;
use toolchat_infrastructure::{
    AzureOpenAiGateway, ChainedTokenCredential, ConfigLoader, McpSession, ValidatedConfig,
};
use toolchat_presentation::{ChatRepl, Cli, TurnProgressReporter};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env first so it can also carry RUST_LOG
    let dotenv = ConfigLoader::load_dotenv();
    let _log_guard = init_logging(&cli)?;
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    let result = runtime.block_on(run(cli));
    // A blocking stdin read may still be parked after an interrupt.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

/// Initialize logging based on verbosity level (or `RUST_LOG`).
///
/// Logs go to stderr, or to `--log-file` through a non-blocking writer.
fn init_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            Ok(None)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting toolchat");

    // === Configuration ===
    let file_config = if cli.no_config {
        ConfigLoader::load_without_files()
    } else {
        ConfigLoader::load(cli.config.as_deref())
    }
    .context("Failed to load configuration")?;

    if cli.show_config {
        println!("{}", ConfigLoader::describe_sources(cli.config.as_deref()));
        println!("Effective configuration:\n");
        println!(
            "{}",
            file_config
                .to_toml()
                .context("Failed to render configuration")?
        );
        return Ok(());
    }

    let config = file_config.validate()?;

    // === Dependency Injection ===
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let credential = Arc::new(ChainedTokenCredential::from_settings(
        &config.credentials,
        client.clone(),
    ));
    info!(
        "Credential sources: {}",
        credential.source_names().join(" -> ")
    );

    // Fail here, before any conversation, if no source can produce a token.
    if let Err(e) = credential.get_token().await {
        bail!("{}", e.guidance());
    }

    let gateway = Arc::new(AzureOpenAiGateway::new(
        client,
        credential,
        config.completion.clone(),
    ));

    // From here on an interrupt ends the program through the normal path,
    // which always closes the tool server session.
    let cancellation = CancellationToken::new();
    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let session = Arc::new(McpSession::new(config.backend.clone()));
    let result = chat(&cli, &config, gateway, session.clone(), cancellation).await;
    session.close().await;
    result
}

async fn chat(
    cli: &Cli,
    config: &ValidatedConfig,
    gateway: Arc<AzureOpenAiGateway>,
    session: Arc<McpSession>,
    cancellation: CancellationToken,
) -> Result<()> {
    tokio::select! {
        started = session.start() => started
            .with_context(|| format!("Failed to start tool server '{}'", config.backend.command))?,
        _ = cancellation.cancelled() => {
            info!("Interrupted while starting the tool server");
            return Ok(());
        }
    }

    let catalog = session
        .list_tools()
        .await
        .context("Failed to list tools from the tool server")?;
    let functions = adapt(&catalog).context("Tool server published an unusable tool")?;
    info!("Tool server offers {} tools", functions.len());
    if functions.is_empty() {
        warn!("Tool server offers no tools; the model will answer on its own");
    }

    let progress: Arc<dyn TurnProgress> = if cli.quiet {
        Arc::new(NoTurnProgress)
    } else {
        Arc::new(TurnProgressReporter::new())
    };

    let orchestrator =
        ConversationOrchestrator::new(gateway, session, functions, config.execution.clone())
            .with_progress(progress);

    let mut repl = ChatRepl::new(orchestrator, config.completion.model.clone())
        .with_cancellation(cancellation);
    repl.run().await.context("Chat input/output failed")?;

    Ok(())
}
