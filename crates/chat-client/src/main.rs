//! Chat relay console client entry point.
//!
//! # Session loop (for beginners)
//!
//! After connecting and registering, `main` waits on two things at once
//! with `tokio::select!`:
//!
//! - the next message from the server, which is printed immediately;
//! - the next line typed on stdin, which is sent as a chat message and
//!   echoed locally as `You: ...`.
//!
//! Typing `exit` (any case), closing stdin, or the server closing the
//! connection ends the loop.

use std::io::{BufRead, Write};

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chat_client::application::console::{
    parse_input_line, render_incoming, render_outgoing, resolve_username, InputLine,
    SERVER_CLOSED,
};
use chat_client::ChatClient;
use chat_core::protocol::messages::DEFAULT_PORT;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Console client for the chat relay.
#[derive(Debug, Parser)]
#[command(name = "chat-client", version)]
struct Cli {
    /// Relay address as `host:port`.
    #[arg(long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"), env = "CHAT_SERVER_ADDR")]
    server: String,

    /// Display name.  Prompted for on stdin when omitted.
    #[arg(long, env = "CHAT_USERNAME")]
    username: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so they never interleave with chat output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdin = spawn_stdin_reader();

    let username = match cli.username {
        Some(name) => resolve_username(Some(&name)),
        None => {
            print!("Enter your username: ");
            std::io::stdout().flush().context("failed to write prompt")?;
            resolve_username(stdin.recv().await.as_deref())
        }
    };

    println!("Connecting to {}...", cli.server);
    let client = ChatClient::connect(cli.server.as_str())
        .await
        .context("make sure the server is running and the address is correct")?;
    println!("Connected to server!");

    let (mut reader, mut writer) = client.into_split();
    writer.register(&username).await.context("failed to register")?;

    loop {
        tokio::select! {
            incoming = reader.next_message() => match incoming {
                Ok(Some(msg)) => println!("{}", render_incoming(&msg)),
                Ok(None) => {
                    println!("{SERVER_CLOSED}");
                    break;
                }
                Err(e) => {
                    println!("Error reading messages: {e}");
                    break;
                }
            },
            line = stdin.recv() => {
                let Some(line) = line else {
                    debug!("stdin closed");
                    break;
                };
                match parse_input_line(&line) {
                    InputLine::Skip => {}
                    InputLine::Exit => break,
                    InputLine::Send(text) => {
                        if let Err(e) = writer.send_chat(&text).await {
                            println!("Error sending message: {e}");
                            break;
                        }
                        println!("{}", render_outgoing(&text));
                    }
                }
            }
        }
    }

    // The server may already be gone; nothing useful to do with the error.
    let _ = writer.shutdown().await;
    Ok(())
}

/// Reads stdin on a plain thread and forwards each line.
///
/// The thread is never joined; it dies with the process when `main` returns.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

// ── Tests ─────────────────────────────────────────────────────────────────────
