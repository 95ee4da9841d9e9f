//! Interactive chat loop on stdin.
//!
//! Each line is one turn through the orchestrator. Slash commands map to the
//! conversation lifecycle operations.

pub mod commands;

use std::io::Write;

use anyhow::Result;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use sihah_types::agent::AgentConfig;
use sihah_types::chat::{Conversation, Metadata};
use sihah_types::llm::MessageRole;
use sihah_types::turn::TurnResult;

use crate::state::AppState;
use crate::telemetry::traced_turn;
use commands::ChatCommand;

/// Run the chat loop until `/exit`, EOF, or the conversation leaves the
/// active state.
pub async fn run_chat(
    state: &AppState,
    agent: AgentConfig,
    conversation_id: Option<Uuid>,
    channel: &str,
    json: bool,
) -> Result<()> {
    let conversation_id = conversation_id.unwrap_or_else(Uuid::now_v7);

    if !json {
        println!();
        println!(
            "  {} {} {}",
            style("💬").bold(),
            style(&agent.name).cyan().bold(),
            style(format!("({})", agent.model)).dim()
        );
        println!("  {}", style(format!("conversation {conversation_id}")).dim());
        println!("  {}", style("Type /help for commands.").dim());
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if !json {
            print!("{} ", style("›").green().bold());
            std::io::stdout().flush()?;
        }

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(cmd) = commands::parse(input) {
            let outcome = match cmd {
                ChatCommand::Help => {
                    commands::print_help();
                    continue;
                }
                ChatCommand::Exit => break,
                ChatCommand::History => {
                    print_history(state, conversation_id, json).await;
                    continue;
                }
                ChatCommand::End(reason) => {
                    state
                        .orchestrator
                        .end_conversation(conversation_id, reason.as_deref())
                        .await
                }
                ChatCommand::Pause(reason) => {
                    state
                        .orchestrator
                        .pause_conversation(conversation_id, reason.as_deref())
                        .await
                }
                ChatCommand::Transfer { target, reason } => {
                    state
                        .orchestrator
                        .transfer_conversation(conversation_id, &target, reason.as_deref())
                        .await
                }
                ChatCommand::Unknown(what) => {
                    eprintln!("  {} unknown command: {what}", style("?").yellow());
                    continue;
                }
            };
            match outcome {
                Ok(conversation) => {
                    print_status(&conversation, json)?;
                    if !conversation.status.accepts_turns() {
                        break;
                    }
                }
                Err(e) => eprintln!("  {} {e}", style("✗").red()),
            }
            continue;
        }

        let mut metadata = Metadata::new();
        metadata.insert("channel".into(), serde_json::json!(channel));

        let result = traced_turn(
            conversation_id,
            &agent,
            state
                .orchestrator
                .process_turn(conversation_id, &agent, input, metadata),
        )
        .await;

        match result {
            Ok(turn) => print_reply(&turn, json)?,
            Err(e) => {
                eprintln!("  {} {e}", style("✗").red());
                if matches!(
                    e.kind(),
                    sihah_types::error::TurnErrorKind::ConversationUnavailable
                ) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn print_reply(turn: &TurnResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(turn)?);
        return Ok(());
    }

    println!();
    println!("  {}", turn.reply);
    if !turn.suggested_actions.is_empty() {
        println!();
        for action in &turn.suggested_actions {
            println!("  {} {action}", style("→").cyan());
        }
    }
    let p = &turn.processing;
    let mut info = format!(
        "{} · {} attempt(s) · {} chunk(s) · confidence {:.2} · {}ms",
        p.model, p.attempts, p.context_chunks, turn.confidence, p.duration_ms
    );
    if p.fell_back {
        info.push_str(" · default model");
    }
    if p.retrieval_degraded {
        info.push_str(" · retrieval unavailable");
    }
    println!("  {}", style(info).dim());
    println!();
    Ok(())
}

fn print_status(conversation: &Conversation, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(conversation)?);
    } else {
        println!(
            "  {} conversation is now {}",
            style("●").yellow(),
            style(conversation.status).bold()
        );
    }
    Ok(())
}

async fn print_history(state: &AppState, conversation_id: Uuid, json: bool) {
    let messages = match state.orchestrator.list_messages(conversation_id).await {
        Ok(messages) => messages,
        Err(e) => {
            eprintln!("  {} {e}", style("✗").red());
            return;
        }
    };

    for msg in messages {
        if json {
            if let Ok(line) = serde_json::to_string(&msg) {
                println!("{line}");
            }
            continue;
        }
        let who = match msg.role {
            MessageRole::User => style("you").green().to_string(),
            MessageRole::Assistant => style("agent").cyan().to_string(),
            _ => style("system").dim().to_string(),
        };
        println!("  [{}] {who}: {}", msg.seq, msg.content);
    }
}
