//! `sihah ingest`: queue a text file for an agent's knowledge base.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use uuid::Uuid;

use sihah_core::ingest::queue::{WorkQueue, submit_document};
use sihah_types::chat::Metadata;
use sihah_types::ingest::{IngestJob, IngestJobStatus};
use sihah_types::knowledge::KnowledgeDocument;

use crate::state::AppState;

/// Document id derived from the file name when none is given.
fn default_document_id(file: &Path) -> Option<String> {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

pub async fn ingest_file(
    state: &AppState,
    agent_id: Uuid,
    file: &Path,
    document_id: Option<String>,
    wait: bool,
    json: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let document_id = document_id
        .or_else(|| default_document_id(file))
        .context("cannot derive a document id, pass --document-id")?;

    let mut metadata = Metadata::new();
    metadata.insert("source".into(), serde_json::json!(file.display().to_string()));

    let job = submit_document(
        state.queue.as_ref(),
        KnowledgeDocument {
            agent_id,
            document_id,
            text,
            metadata,
            submitted_at: Utc::now(),
        },
    )
    .await?;

    let job = if wait { run_until_settled(state, job).await? } else { job };
    print_job(&job, json)
}

/// Process queued jobs in-process until `job` is done or dead-lettered.
async fn run_until_settled(state: &AppState, job: IngestJob) -> Result<IngestJob> {
    let pool = state.worker_pool()?;
    let poll = std::time::Duration::from_millis(state.config.ingest.poll_interval_ms.max(1));

    loop {
        let outcome = pool.process_next().await?;
        let current = state
            .queue
            .get_job(&job.id)
            .await?
            .context("queued job disappeared")?;
        if matches!(current.status, IngestJobStatus::Done | IngestJobStatus::Failed) {
            return Ok(current);
        }
        if outcome.is_none() {
            tokio::time::sleep(poll).await;
        }
    }
}

fn print_job(job: &IngestJob, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(job)?);
        return Ok(());
    }

    let status = match job.status {
        IngestJobStatus::Done => style(job.status).green(),
        IngestJobStatus::Failed => style(job.status).red(),
        _ => style(job.status).yellow(),
    };
    println!();
    println!(
        "  {} {} → agent {}",
        style("📄").bold(),
        style(job.operation.document_id()).cyan(),
        job.operation.agent_id()
    );
    println!("  job {}  {status}", style(job.id).dim());
    if let Some(err) = &job.last_error {
        println!("  {} {err}", style("last error:").red());
    }
    println!();
    Ok(())
}
