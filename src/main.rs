//! Parley CLI binary entry point.

use clap::Parser;
use tracing::info;

use parley::cli::{run_repl, Cli};
use parley::config::ParleyConfig;
use parley::mcp::ServerRegistry;
use parley::session::ConversationSession;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ParleyConfig::from_env()?;
    if let Some(path) = cli.history_file {
        config.history_file = path;
    }
    config.debug |= cli.debug;

    let servers = match cli.servers {
        Some(path) => ServerRegistry::from_toml_file(&path)?.into_specs(),
        None => config.default_servers(),
    };
    let thread_id = cli
        .thread_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut session = ConversationSession::from_config(&config, thread_id, servers)?;
    if cli.reset {
        session.reset()?;
    }
    session.connect().await?;

    println!(
        "\nMCP client ready (thread {}, debug = {})\n",
        session.thread_id(),
        config.debug
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = run_repl(&mut session, stdin, tokio::io::stdout()).await;

    info!(thread_id = session.thread_id(), "shutting down");
    session.close().await?;
    result?;
    Ok(())
}
