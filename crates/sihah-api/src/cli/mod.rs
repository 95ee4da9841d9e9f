//! CLI command definitions for the `sihah` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod agent;
pub mod chat;
pub mod ingest;
pub mod status;
pub mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

/// Hebrew-aware conversation pipeline.
#[derive(Parser)]
#[command(name = "sihah", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "SIHAH_LOG_JSON")]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "SIHAH_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP/WebSocket API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Do not run ingestion workers in this process.
        #[arg(long)]
        no_workers: bool,
    },

    /// Interactive conversation on stdin.
    Chat {
        /// Conversation to continue. A new one is started when omitted.
        conversation_id: Option<Uuid>,

        /// Agent definition (TOML).
        #[arg(short, long)]
        agent: PathBuf,

        /// Channel recorded on a new conversation.
        #[arg(long, default_value = "cli")]
        channel: String,
    },

    /// Queue a text file for indexing into an agent's knowledge base.
    Ingest {
        agent_id: Uuid,

        file: PathBuf,

        /// Document id. Defaults to the file name.
        #[arg(long)]
        document_id: Option<String>,

        /// Wait for the job to finish, running a worker in-process.
        #[arg(long)]
        wait: bool,
    },

    /// Run ingestion workers until interrupted.
    Worker,

    /// Pipeline and ingestion queue status.
    Status,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
