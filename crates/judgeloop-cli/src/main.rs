//! judgeloop CLI
//!
//! Serves a compile-and-repair session over HTTP, or runs a single source
//! file through the judge from the terminal.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use judgeloop_orchestrator::{
    create_router, AppState, Config, NotificationLevel, Session, SessionEvent, SessionSnapshot,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// judgeloop - compile, judge and repair code with an AI assistant
#[derive(Parser, Debug)]
#[command(name = "judgeloop")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: judgeloop.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the session HTTP API and event stream
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Compile and run a source file once
    Run {
        /// Source file to submit
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Judge language id (default from config)
        #[arg(short, long, value_name = "ID")]
        language: Option<u32>,

        /// Ask the AI backend for a fix when the run fails
        #[arg(long)]
        fix: bool,

        /// Write the fixed code back to FILE
        #[arg(long, requires = "fix")]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    let result = match load_config(args.config.as_deref()) {
        Ok(config) => match args.command {
            Command::Serve { port } => serve(&config, port).await.map(|()| true),
            Command::Run {
                file,
                language,
                fix,
                write,
            } => run_file(&config, &file, language, fix, write).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Serves the HTTP API until Ctrl+C.
async fn serve(config: &Config, port: u16) -> anyhow::Result<()> {
    let session = Session::from_config(config).map_err(|e| anyhow::anyhow!("{e}"))?;
    print_config(config);

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let router = create_router(AppState::new(session.clone()));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Event stream on ws://{addr}/ws");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    session.shutdown().await;
    println!("Server stopped");
    Ok(())
}

/// Compiles one file, optionally repairing it.
///
/// Returns `Ok(false)` when the program did not run cleanly.
async fn run_file(
    config: &Config,
    file: &Path,
    language: Option<u32>,
    fix: bool,
    write: bool,
) -> anyhow::Result<bool> {
    let code = tokio::fs::read_to_string(file).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read '{}': {e}\n\nSuggestion: Check that the file exists and is readable",
            file.display()
        )
    })?;

    let session = Session::from_config(config).map_err(|e| anyhow::anyhow!("{e}"))?;
    session.set_code(code).await;
    if let Some(id) = language {
        session
            .select_language(id)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    let mut events = session.subscribe();

    let snapshot = session.snapshot().await;
    println!("Submitting {} as {}", file.display(), snapshot.language.name);

    session
        .compile()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?
        .await?;
    fail_on_error_notification(&mut events)?;

    let snapshot = session.snapshot().await;
    println!();
    println!("{}", render_run(&snapshot));

    if !snapshot.error_occurred {
        return Ok(true);
    }
    if !fix {
        return Ok(false);
    }

    println!();
    println!("Asking the assistant for a fix...");
    session
        .regenerate()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?
        .await?;
    fail_on_error_notification(&mut events)?;

    let fixed = session.snapshot().await.code;
    println!();
    println!("{}", render_fix(&fixed));

    if write {
        tokio::fs::write(file, &fixed).await?;
        println!();
        println!("Fixed code written to {}", file.display());
    }
    Ok(false)
}

/// Turns an error notification raised by the session into an error.
fn fail_on_error_notification(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> anyhow::Result<()> {
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Notification(n) = event {
            if n.level == NotificationLevel::Error {
                anyhow::bail!("{}", n.message);
            }
            tracing::info!(message = %n.message, "Notification");
        }
    }
    Ok(())
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Judge: {}", config.judge.base_url);
    println!("  AI backend: {}", config.ai.base_url);
    println!("  Poll interval: {}ms", config.poll_interval_ms);
    println!("  Default language: {}", config.default_language_id);
}

/// Renders the verdict of a finished run.
fn render_run(snapshot: &SessionSnapshot) -> String {
    let Some(outcome) = &snapshot.outcome else {
        return "No result".to_string();
    };
    let mut out = format!(
        "=== {} ({}) ===",
        outcome.description, snapshot.language.name
    );
    if let Some(output) = &snapshot.output {
        if let (Some(time), Some(memory)) = (&output.time, output.memory) {
            let _ = write!(out, "\nTime: {time}s  Memory: {memory} KB");
        }
    }
    let body = outcome.display_text();
    if !body.is_empty() {
        out.push('\n');
        out.push_str(body.trim_end());
    }
    out
}

/// Renders regenerated code.
fn render_fix(code: &str) -> String {
    format!("=== Suggested fix ===\n{}", code.trim_end())
}

// ============================================================================
// Tests
// ============================================================================
