use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;

use chatsync::{ChatSync, ChatSyncConfig, Message, SessionUpdate, init_tracing};

/// Follows one conversation and prints its messages as they arrive
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Bearer token for the REST API and the event socket
    #[clap(long, env = "CHATSYNC_TOKEN", hide_env_values = true)]
    token: String,

    /// Id of the signed-in user
    #[clap(long, value_name = "USER_ID")]
    viewer: String,

    /// Conversation to follow
    #[clap(long, value_name = "CHAT_ID")]
    conversation: String,

    /// Overrides CHATSYNC_API_BASE_URL
    #[clap(long, value_name = "URL")]
    api_url: Option<String>,

    /// Directory for rolling log files
    #[clap(long, value_name = "PATH")]
    logs_dir: Option<PathBuf>,

    /// Sends this text once the history has loaded
    #[clap(long)]
    say: Option<String>,
}

fn print_message(message: &Message, viewer: &str) {
    let who = if message.sender_id() == viewer {
        "me".to_string()
    } else {
        message
            .sender
            .profile()
            .map(|p| p.display_name())
            .unwrap_or_else(|| message.sender_id().to_string())
    };
    let body = message
        .content
        .as_deref()
        .or(message.media_ref.as_deref())
        .unwrap_or("");
    println!("[{}] {}: {}", message.sent_at.format("%H:%M"), who, body);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.api_url {
        Some(url) => ChatSyncConfig::new(url),
        None => ChatSyncConfig::from_env()?,
    };
    if let Some(dir) = &args.logs_dir {
        config = config.with_logs_dir(dir);
    }
    init_tracing(config.logs_dir.as_deref())?;

    let invalidator = Arc::new(|| {
        tracing::warn!(target: "chatsync_tail", "Session expired, log in again");
    });
    let engine = ChatSync::connect(config, &args.viewer, &args.token, invalidator).await?;
    let handle = engine.open_conversation(&args.conversation).await?;
    let mut updates = handle.subscribe_updates();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(SessionUpdate::Loaded { count }) => {
                    tracing::info!(target: "chatsync_tail", "Loaded {} messages", count);
                    let snapshot = handle.snapshot().await?;
                    for row in snapshot.view.rows() {
                        print_message(row.message, &args.viewer);
                    }
                    if let Some(summary) = snapshot.view.seen_summary(3) {
                        let names: Vec<String> = summary
                            .shown
                            .iter()
                            .map(|r| r.display.display_name.clone().unwrap_or_else(|| r.user_id.clone()))
                            .collect();
                        println!("  seen by {} (+{})", names.join(", "), summary.overflow);
                    }
                    if let Some(text) = &args.say {
                        handle.send(text, None).await?;
                    }
                }
                Ok(SessionUpdate::MessageAdded { message, .. }) => {
                    print_message(&message, &args.viewer);
                }
                Ok(SessionUpdate::SeenUpdated { message_id, user_id }) => {
                    println!("  {user_id} saw {message_id}");
                }
                Ok(SessionUpdate::RemoteTyping(true)) => println!("  typing..."),
                Ok(SessionUpdate::SessionExpired) | Ok(SessionUpdate::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "chatsync_tail", "Skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.close_active().await?;
    Ok(())
}
