mod config;
mod error;
mod logging;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use runtime::{OpenAiBackend, Pipeline, ReplText, Session, ToolHost, ToolRegistry, run_repl};
use tokio::io::BufReader;
use tokio::time::Instant;
use tracing::{info, warn};

use config::{Config, LogFormat, Overrides};
use error::Result;
use render::ConsoleRenderer;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "A terminal chatbot that can call MCP tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./parley.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream tokens as they are generated
    #[arg(long)]
    stream: bool,

    /// Do not keep answers in the conversation history
    #[arg(long)]
    no_history: bool,

    /// Keep only the last N turns in the conversation
    #[arg(long, value_name = "N")]
    window: Option<usize>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            stream: self.stream,
            no_history: self.no_history,
            window: self.window,
            log_file: self.log_file.clone(),
            log_format: self.log_format,
        }
    }
}

#[tokio::main]
async fn main() {
    // Exit explicitly: a pending stdin read would otherwise hold the
    // runtime open after Ctrl-C.
    let code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::discover(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok())?;
    config.apply_overrides(cli.overrides());
    logging::init(&config.logging)?;

    let settings = config.session_settings()?;
    let mut backend = OpenAiBackend::builder(config.api_key()?);
    if let Some(base_url) = &config.model.base_url {
        backend = backend.base_url(base_url);
    }
    let backend = Arc::new(backend.build());

    let registry = Arc::new(ToolRegistry::mcp());
    let deadline = Instant::now() + config.registration_timeout();
    if let Err(e) = registry.register_all(&config.backends, deadline).await {
        warn!(error = %e, "continuing without some tool backends");
        eprintln!("Warning: {e}");
    }

    let tools = registry.catalogue().await;
    info!(
        model = %settings.params.model,
        backend = %backend,
        servers = ?registry.servers().await,
        tools = tools.len(),
        "starting conversation"
    );
    println!(
        "parley v{} ({}, {} tools)",
        env!("CARGO_PKG_VERSION"),
        settings.params.model,
        tools.len()
    );
    println!("Type 'exit' to quit.\n");

    let session = Session::new(backend, Arc::clone(&registry), settings)?;
    let mut pipeline = Pipeline::spawn(session, ConsoleRenderer::new(std::io::stdout()));

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted");
            cancel.cancel();
        }
    });

    let text = ReplText::default();
    let outcome = run_repl(
        &mut pipeline,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
        &text,
    )
    .await;

    if pipeline.is_cancelled() {
        println!("\n{}", text.farewell);
    }
    pipeline.shutdown().await;
    registry.shutdown().await;
    outcome?;
    Ok(())
}
