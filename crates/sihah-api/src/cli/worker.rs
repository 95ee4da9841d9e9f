//! `sihah worker`: run ingestion workers until interrupted.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub async fn run_workers(state: &AppState, quiet: bool) -> Result<()> {
    let pool = state.worker_pool()?;
    pool.start();

    if !quiet {
        println!(
            "  {} {} ingest worker(s) running",
            style("⚙").bold(),
            state.config.ingest.workers.max(1)
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    crate::shutdown_signal().await;
    pool.shutdown().await;

    if !quiet {
        println!("\n  Workers stopped.");
    }
    Ok(())
}
