//! System status command.

use anyhow::Result;
use console::style;

use sihah_types::ingest::IngestJobStatus;

use crate::state::AppState;

/// Display pipeline configuration and ingestion queue depth.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let counts = state.queue.status_counts().await?;
    let count_of = |wanted: IngestJobStatus| {
        counts
            .iter()
            .find(|(s, _)| *s == wanted)
            .map_or(0, |(_, n)| *n)
    };
    let models = &state.config.models;

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "default_model": models.default_model,
            "providers": models.providers.iter().map(|p| &p.name).collect::<Vec<_>>(),
            "retrieval": state.indexer.is_some(),
            "ingest_jobs": {
                "queued": count_of(IngestJobStatus::Queued),
                "running": count_of(IngestJobStatus::Running),
                "done": count_of(IngestJobStatus::Done),
                "failed": count_of(IngestJobStatus::Failed),
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  {} Sihah v{}", style("⚡").bold(), env!("CARGO_PKG_VERSION"));
    println!("  {}", style(state.data_dir.display()).dim());
    println!();

    println!("  {}", style("── Models ──").dim());
    println!("  Default:  {}", style(&models.default_model).bold());
    for provider in &models.providers {
        println!(
            "  {:<9} {} ({})",
            provider.name,
            provider.models.join(", "),
            style(&provider.base_url).dim()
        );
    }
    println!();

    println!("  {}", style("── Knowledge ──").dim());
    if state.indexer.is_some() {
        println!("  Retrieval: {}", style("enabled").green());
    } else {
        println!("  Retrieval: {}", style("disabled (no embedding endpoint)").yellow());
    }
    println!("  Queued:    {}", count_of(IngestJobStatus::Queued));
    println!("  Running:   {}", count_of(IngestJobStatus::Running));
    println!("  Done:      {}", style(count_of(IngestJobStatus::Done)).green());
    let failed = count_of(IngestJobStatus::Failed);
    if failed > 0 {
        println!("  Failed:    {}", style(failed).red());
    }
    println!();

    Ok(())
}
