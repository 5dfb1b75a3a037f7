//! Output rendering for chat sessions.
//!
//! This module provides the [`Renderer`] trait, a plain-text implementation,
//! and [`SessionView`], which turns session events into renderer calls.

use std::io::{self, Stdout, Write};
use std::sync::{Mutex, PoisonError};

use crate::chat::{SessionEvent, SessionObserver, SessionState};
use crate::types::{Message, Sender};
use crate::utils::time::clock;

/// ANSI escape code for dim text (used for timestamps and the pending marker).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the user label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the assistant label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for error entries).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering session output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing output in tests
pub trait Renderer: Send {
    /// Print one committed message.
    fn print_message(&mut self, message: &Message);

    /// Indicate that a request is in flight.
    fn print_pending(&mut self);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when the user interrupts a pending request.
    fn print_interrupted(&mut self) {}
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Formats a message as a single block of text, without a trailing newline.
    pub fn format_message(&self, message: &Message) -> String {
        let time = clock(&message.timestamp);
        let label = match message.sender {
            Sender::User => "You",
            Sender::Assistant => "Bot",
        };
        if !self.use_color {
            return format!("[{time}] {label}: {}", message.text);
        }
        let color = match message.sender {
            Sender::User => ANSI_CYAN,
            Sender::Assistant if message.is_error => ANSI_RED,
            Sender::Assistant => ANSI_GREEN,
        };
        if message.is_error {
            format!(
                "{ANSI_DIM}[{time}]{ANSI_RESET} {color}{label}: {}{ANSI_RESET}",
                message.text
            )
        } else {
            format!(
                "{ANSI_DIM}[{time}]{ANSI_RESET} {color}{label}:{ANSI_RESET} {}",
                message.text
            )
        }
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_message(&mut self, message: &Message) {
        let line = self.format_message(message);
        println!("{line}");
        self.flush();
    }

    fn print_pending(&mut self) {
        if self.use_color {
            println!("{ANSI_DIM}...{ANSI_RESET}");
        } else {
            println!("...");
        }
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        println!("{info}");
        self.flush();
    }

    fn print_interrupted(&mut self) {
        println!("\n[interrupted]");
        self.flush();
    }
}

/// Renders a session as it changes.
///
/// Subscribe it to a controller; it prints the pending marker when a request
/// starts and the new entry when one settles.  User messages are not echoed
/// because the user just typed them.
pub struct SessionView<R> {
    renderer: Mutex<R>,
    show_failures: bool,
}

impl<R: Renderer> SessionView<R> {
    /// Wraps `renderer`.
    pub fn new(renderer: R) -> Self {
        Self {
            renderer: Mutex::new(renderer),
            show_failures: false,
        }
    }

    /// Also print the underlying error whenever a request fails.
    pub fn with_failure_details(mut self, show: bool) -> Self {
        self.show_failures = show;
        self
    }

    /// Runs `f` against the wrapped renderer.
    pub fn with_renderer<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut renderer = self.renderer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *renderer)
    }

    /// Prints every message in `state`.
    pub fn print_history(&self, state: &SessionState) {
        self.with_renderer(|renderer| {
            if state.log.is_empty() {
                renderer.print_info("(no messages)");
            }
            for message in &state.log {
                renderer.print_message(message);
            }
        })
    }
}

impl<R: Renderer> SessionObserver for SessionView<R> {
    fn on_event(&self, event: &SessionEvent, state: &SessionState) {
        self.with_renderer(|renderer| match event {
            SessionEvent::DraftUpdated => {}
            SessionEvent::Submitted => renderer.print_pending(),
            SessionEvent::Replied => {
                if let Some(message) = state.log.last() {
                    renderer.print_message(message);
                }
            }
            SessionEvent::Failed { error } => {
                if let Some(message) = state.log.last() {
                    renderer.print_message(message);
                }
                if self.show_failures {
                    renderer.print_error(&error.to_string());
                }
            }
            SessionEvent::Reset => renderer.print_info("Conversation cleared."),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use time::macros::datetime;

    #[derive(Default)]
    struct Recording {
        lines: Vec<String>,
    }

    impl Renderer for Recording {
        fn print_message(&mut self, message: &Message) {
            self.lines
                .push(format!("{}:{}", message.sender, message.text));
        }

        fn print_pending(&mut self) {
            self.lines.push("pending".to_string());
        }

        fn print_error(&mut self, error: &str) {
            self.lines.push(format!("error:{error}"));
        }

        fn print_info(&mut self, info: &str) {
            self.lines.push(format!("info:{info}"));
        }
    }

    fn stamped(mut message: Message) -> Message {
        message.timestamp = datetime!(2024-05-01 09:05:00 UTC);
        message
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn plain_format_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        let message = stamped(Message::assistant("Hi there"));
        assert_eq!(renderer.format_message(&message), "[09:05] Bot: Hi there");
        let message = stamped(Message::user("Hello"));
        assert_eq!(renderer.format_message(&message), "[09:05] You: Hello");
    }

    #[test]
    fn error_entries_are_red() {
        let renderer = PlainTextRenderer::with_color(true);
        let formatted = renderer.format_message(&Message::error_marker());
        assert!(formatted.contains(ANSI_RED));
        let formatted = renderer.format_message(&Message::assistant("fine"));
        assert!(!formatted.contains(ANSI_RED));
    }

    #[test]
    fn view_renders_settled_entries() {
        let view = SessionView::new(Recording::default()).with_failure_details(true);
        let mut state = SessionState {
            log: vec![Message::user("Ping")],
            pending: true,
            draft: String::new(),
        };
        view.on_event(&SessionEvent::Submitted, &state);

        state.log.push(Message::error_marker());
        state.pending = false;
        view.on_event(
            &SessionEvent::Failed {
                error: Error::connection("refused", None),
            },
            &state,
        );
        view.on_event(&SessionEvent::Reset, &SessionState::default());

        let lines = view.with_renderer(|r| r.lines.clone());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "pending");
        assert!(lines[1].starts_with("assistant:[error]"));
        assert_eq!(lines[2], "error:Connection error: refused");
        assert_eq!(lines[3], "info:Conversation cleared.");
    }

    #[test]
    fn history_of_empty_session() {
        let view = SessionView::new(Recording::default());
        view.print_history(&SessionState::default());
        let lines = view.with_renderer(|r| r.lines.clone());
        assert_eq!(lines, vec!["info:(no messages)".to_string()]);
    }
}
