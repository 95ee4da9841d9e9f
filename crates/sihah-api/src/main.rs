//! Sihah CLI and HTTP API entry point.
//!
//! Binary name: `sihah`
//!
//! Parses CLI arguments, initializes storage and providers, then dispatches
//! to the appropriate command handler or starts the API server.

mod cli;
mod http;
mod state;
mod telemetry;

use clap::Parser;
use clap_complete::generate;

use sihah_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing, verbosity_filter};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        default_filter: verbosity_filter(cli.verbose, cli.quiet).to_string(),
        json: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("initializing tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "sihah", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            no_workers,
        } => {
            state.orchestrator.start();

            let workers = if no_workers {
                None
            } else {
                match state.worker_pool() {
                    Ok(pool) => {
                        pool.start();
                        Some(pool)
                    }
                    Err(e) => {
                        tracing::warn!("Ingest workers not started: {e:#}");
                        None
                    }
                }
            };

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} Sihah API listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let router = http::router::build_router(state.clone());
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            state.orchestrator.shutdown().await;
            if let Some(pool) = workers {
                pool.shutdown().await;
            }

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Chat {
            conversation_id,
            agent,
            channel,
        } => {
            let agent = cli::agent::load_agent(&agent).await?;
            state.orchestrator.start();
            let outcome =
                cli::chat::run_chat(&state, agent, conversation_id, &channel, cli.json).await;
            state.orchestrator.shutdown().await;
            outcome?;
        }

        Commands::Ingest {
            agent_id,
            file,
            document_id,
            wait,
        } => {
            cli::ingest::ingest_file(&state, agent_id, &file, document_id, wait, cli.json).await?;
        }

        Commands::Worker => {
            cli::worker::run_workers(&state, cli.quiet).await?;
        }

        Commands::Status => {
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
