//! Workloom CLI and REST API entry point.
//!
//! Binary name: `wloom`
//!
//! Parses CLI arguments, initializes the database and workflow client, then
//! dispatches to a command handler: `serve` (HTTP API, optionally with
//! embedded workers), `work` (worker pools only), `submit`, `status`.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use workloom_infra::runtime::spawn_runtime;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity (or hand over to the OTel bridge).
    if cli.otel {
        workloom_observe::tracing_setup::init_tracing(true)
            .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;
    } else {
        let filter = match cli.verbose {
            0 if cli.quiet => "error",
            0 => "warn",
            1 => "info,workloom=debug",
            _ => "trace",
        };
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_target(false)
            .init();
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "wloom", &mut std::io::stdout());
        return Ok(());
    }

    // Initialize application state (DB, client)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve { port, host, with_workers } => {
            let host = host.unwrap_or_else(|| state.config.http.host.clone());
            let port = port.unwrap_or(state.config.http.port);

            let shutdown = CancellationToken::new();
            let workers = with_workers.then(|| {
                spawn_runtime(&state.db_pool, state.config.worker.clone(), shutdown.clone())
            });

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Workloom API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            if workers.is_some() {
                println!(
                    "  {} Embedded worker pools running",
                    console::style("⚙").bold()
                );
            }
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state.clone());

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            shutdown.cancel();
            if let Some(mut workers) = workers {
                while workers.join_next().await.is_some() {}
            }
            workloom_observe::tracing_setup::shutdown_tracing();
            println!("\n  Server stopped.");
        }

        Commands::Work => {
            let shutdown = CancellationToken::new();
            let mut workers =
                spawn_runtime(&state.db_pool, state.config.worker.clone(), shutdown.clone());

            println!(
                "  {} Worker pools running ({} activity, {} workflow)",
                console::style("⚙").bold(),
                state.config.worker.activity_workers,
                state.config.worker.workflow_workers
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            shutdown_signal().await;
            shutdown.cancel();
            while workers.join_next().await.is_some() {}
            workloom_observe::tracing_setup::shutdown_tracing();
            println!("\n  Workers shut down gracefully.");
        }

        Commands::Submit { file, algorithms, wait } => {
            cli::submit::submit(&state, &file, &algorithms, wait, cli.json).await?;
        }

        Commands::Status { workflow_id, limit } => {
            cli::status::status(&state, workflow_id, limit, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
