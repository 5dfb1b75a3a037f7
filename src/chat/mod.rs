//! Chat session controller and the terminal front end built on it.
//!
//! The controller is the only stateful piece: it owns the message log and the
//! request lifecycle.  Everything else here feeds it commands or renders its
//! snapshots.
//!
//! # Architecture
//!
//! - [`session`]: the controller, its snapshot type, and the observer contract
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig};
pub use session::{
    ChatSessionController, RejectReason, SessionEvent, SessionObserver, SessionState,
    SessionStats, SubmitOutcome, SubscriptionId,
};
