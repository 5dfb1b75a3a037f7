//! Interactive terminal client for a chat endpoint.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the service on http://127.0.0.1:8000/chat
//! chatterbox-chat
//!
//! # Point at another service
//! chatterbox-chat --base-url http://gpu-box:8000
//!
//! # Disable colors (useful for piping output)
//! chatterbox-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Reset the conversation
//! - `/history` - Show the whole conversation
//! - `/save <file>` - Save the transcript as JSON
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application
//!
//! Ctrl+C while a reply is pending resets the conversation; the late reply is
//! dropped when it arrives.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

use chatterbox::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSessionController, PlainTextRenderer, Renderer,
    help_text, parse_command,
};
use chatterbox::{SessionView, SubmitOutcome};

type View = SessionView<PlainTextRenderer>;

/// Main entry point for the chatterbox-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("chatterbox-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    init_tracing(&config);

    let client = config.client()?;
    println!("Chatting with {}", client.endpoint());
    let session = ChatSessionController::new(client);

    let view: Arc<View> = Arc::new(
        SessionView::new(PlainTextRenderer::with_color(config.use_color))
            .with_failure_details(config.verbose),
    );
    session.subscribe(view.clone());

    let mut rl = DefaultEditor::new()?;

    // Ctrl+C outside the line editor means "abandon the pending request".
    let interrupt = Arc::new(Notify::new());
    let interrupt_handler = interrupt.clone();
    ctrlc::set_handler(move || {
        interrupt_handler.notify_waiters();
    })?;

    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => session.reset(),
                        ChatCommand::History => view.print_history(&session.snapshot()),
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::SaveTranscript(path) => {
                            let result = session.save_transcript_to(&path);
                            view.with_renderer(|renderer| match result {
                                Ok(_) => {
                                    renderer.print_info(&format!("Transcript saved to {}", path))
                                }
                                Err(err) => renderer
                                    .print_error(&format!("Failed to save transcript: {}", err)),
                            });
                        }
                        ChatCommand::Stats => print_stats(&session),
                        ChatCommand::ShowConfig => print_config(&config, &session),
                        ChatCommand::Invalid(message) => {
                            view.with_renderer(|renderer| renderer.print_error(&message));
                        }
                    }
                    continue;
                }

                session.update_draft(line);
                send_draft(&session, &interrupt, &view).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                view.with_renderer(|renderer| {
                    renderer.print_error(&format!("Input error: {}", err))
                });
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing(config: &ChatConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Submits the draft and waits for it to settle or for Ctrl+C.
///
/// The request runs on its own task so that an interrupt can reset the
/// session while the request is still in flight.
async fn send_draft(session: &ChatSessionController, interrupt: &Notify, view: &View) {
    let notified = interrupt.notified();
    tokio::pin!(notified);
    notified.as_mut().enable();

    let task_session = session.clone();
    let mut request = tokio::spawn(async move { task_session.submit_draft().await });

    tokio::select! {
        joined = &mut request => match joined {
            Ok(SubmitOutcome::Rejected(reason)) => {
                tracing::debug!(?reason, "draft not sent");
            }
            Ok(_) => {}
            Err(err) => view.with_renderer(|renderer| {
                renderer.print_error(&format!("Request task failed: {}", err))
            }),
        },
        _ = &mut notified => {
            view.with_renderer(|renderer| renderer.print_interrupted());
            session.reset();
        }
    }
}

fn print_stats(session: &ChatSessionController) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Messages: {}", stats.message_count);
    println!("      From you: {}", stats.user_messages);
    println!("      Replies: {}", stats.replies);
    println!("      Failed requests: {}", stats.errors);
    println!(
        "      Pending: {}",
        if stats.pending { "yes" } else { "no" }
    );
    println!("      Ignored submissions: {}", stats.rejected);
    println!("      Discarded late replies: {}", stats.stale_discarded);
    println!("      Resets: {}", stats.resets);
}

fn print_config(config: &ChatConfig, session: &ChatSessionController) {
    println!("    Current Configuration:");
    println!("      Endpoint: {}", session.endpoint().endpoint());
    println!("      Timeout: {}s", config.timeout.as_secs());
    println!(
        "      Color: {}",
        if config.use_color { "on" } else { "off" }
    );
    println!(
        "      Verbose: {}",
        if config.verbose { "on" } else { "off" }
    );
}
